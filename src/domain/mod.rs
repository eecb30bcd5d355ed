// Domain layer: dataset references, manifests and the ports adapters implement.

pub mod manifest;
pub mod model;
pub mod ports;
