//! 把 Metron 角色資料轉成統一的實體格式
use crate::adapters::metron::{MetronCharacter, MetronIssue};
use chrono::Datelike;
use serde::{Deserialize, Serialize};

const POWER_KEYWORDS: &[&str] = &[
    "super",
    "power",
    "strength",
    "speed",
    "flight",
    "invulnerable",
    "telepathy",
    "telekinesis",
];
const WEAKNESS_KEYWORDS: &[&str] = &["weakness", "vulnerable", "kryptonite", "mortal", "fear"];

const TEAM_STRENGTH: f64 = 0.80;
const CREATOR_STRENGTH: f64 = 1.00;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirstAppearance {
    pub comic_title: String,
    pub issue: String,
    pub year: Option<i32>,
    pub month: Option<String>,
    pub cover_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub target_entity_id: String,
    pub target_entity_name: String,
    pub target_entity_type: String,
    pub relationship_type: String,
    pub strength: f64,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub category: String,
    pub name: String,
    pub description: String,
    pub level: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceData {
    pub aliases: Vec<String>,
    pub description: String,
    pub image: Option<String>,
    pub modified: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub entity_id: String,
    pub entity_name: String,
    pub entity_type: String,
    pub publisher: String,
    pub source_entity_id: String,
    pub source_url: String,
    pub first_appearance: Option<FirstAppearance>,
    pub attributes: Vec<Attribute>,
    pub relationships: Vec<Relationship>,
    pub source_data: SourceData,
}

impl EntityRecord {
    pub fn from_character(character: &MetronCharacter, first_issue: Option<&MetronIssue>) -> Self {
        Self {
            entity_id: format!("metron-char-{}", character.id),
            entity_name: character.name.clone(),
            entity_type: "character".to_string(),
            // Metron 收錄多家出版社，角色資料不含出版社
            publisher: "Unknown".to_string(),
            source_entity_id: character.id.to_string(),
            source_url: format!("https://metron.cloud/character/{}/", character.id),
            first_appearance: first_issue.map(first_appearance),
            attributes: extract_attributes(&character.desc),
            relationships: build_relationships(character),
            source_data: SourceData {
                aliases: character.alias.clone(),
                description: character.desc.clone(),
                image: character.image.clone(),
                modified: character.modified.clone(),
            },
        }
    }
}

pub fn first_appearance(issue: &MetronIssue) -> FirstAppearance {
    FirstAppearance {
        comic_title: format!("{} #{}", issue.series.name, issue.number),
        issue: issue.number.clone(),
        year: issue.cover_date.map(|d| d.year()),
        month: issue.cover_date.map(|d| d.format("%B").to_string()),
        cover_url: issue.image.clone(),
    }
}

pub fn build_relationships(character: &MetronCharacter) -> Vec<Relationship> {
    let teams = character.teams.iter().map(|team| Relationship {
        target_entity_id: format!("metron-team-{}", team.id),
        target_entity_name: team.name.clone(),
        target_entity_type: "team".to_string(),
        relationship_type: "teammate".to_string(),
        strength: TEAM_STRENGTH,
        is_active: true,
    });
    let creators = character.creators.iter().map(|creator| Relationship {
        target_entity_id: format!("metron-creator-{}", creator.id),
        target_entity_name: creator.name.clone(),
        target_entity_type: "creator".to_string(),
        relationship_type: "creator".to_string(),
        strength: CREATOR_STRENGTH,
        is_active: true,
    });
    teams.chain(creators).collect()
}

/// 描述文字中的關鍵字比對（子字串、不分大小寫）
pub fn extract_attributes(desc: &str) -> Vec<Attribute> {
    if desc.is_empty() {
        return Vec::new();
    }

    let lowered = desc.to_lowercase();
    let excerpt: String = desc.chars().take(100).collect();
    let description = format!("Extracted from: {}...", excerpt);

    let mut attributes = keyword_attributes(&lowered, POWER_KEYWORDS, "power", "secondary", &description);
    attributes.extend(keyword_attributes(
        &lowered,
        WEAKNESS_KEYWORDS,
        "weakness",
        "primary",
        &description,
    ));
    attributes
}

fn keyword_attributes(
    lowered: &str,
    keywords: &[&str],
    category: &str,
    level: &str,
    description: &str,
) -> Vec<Attribute> {
    keywords
        .iter()
        .filter(|kw| lowered.contains(**kw))
        .map(|kw| Attribute {
            category: category.to_string(),
            name: capitalize(kw),
            description: description.to_string(),
            level: level.to_string(),
            is_active: true,
        })
        .collect()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::metron::{NamedRef, SeriesName};
    use chrono::NaiveDate;

    fn superman() -> MetronCharacter {
        MetronCharacter {
            id: 7,
            name: "Superman".into(),
            alias: vec!["Kal-El".into(), "Clark Kent".into()],
            desc: "Possesses super strength and flight, but is vulnerable to Kryptonite.".into(),
            image: Some("https://static.metron.cloud/superman.jpg".into()),
            creators: vec![NamedRef { id: 11, name: "Jerry Siegel".into() }],
            teams: vec![NamedRef { id: 3, name: "Justice League".into() }],
            modified: Some("2024-01-02T03:04:05Z".into()),
        }
    }

    #[test]
    fn test_character_becomes_entity() {
        let issue = MetronIssue {
            id: 1,
            series: SeriesName { name: "Action Comics".into() },
            number: "1".into(),
            cover_date: NaiveDate::from_ymd_opt(1938, 6, 1),
            image: Some("https://static.metron.cloud/ac1.jpg".into()),
        };

        let entity = EntityRecord::from_character(&superman(), Some(&issue));

        assert_eq!(entity.entity_id, "metron-char-7");
        assert_eq!(entity.source_url, "https://metron.cloud/character/7/");
        assert_eq!(entity.publisher, "Unknown");
        let first = entity.first_appearance.unwrap();
        assert_eq!(first.comic_title, "Action Comics #1");
        assert_eq!(first.year, Some(1938));
        assert_eq!(first.month.as_deref(), Some("June"));
        assert_eq!(entity.source_data.aliases.len(), 2);
    }

    #[test]
    fn test_relationships_teams_then_creators() {
        let rels = build_relationships(&superman());
        assert_eq!(rels.len(), 2);
        assert_eq!(rels[0].target_entity_id, "metron-team-3");
        assert_eq!(rels[0].relationship_type, "teammate");
        assert_eq!(rels[0].strength, 0.80);
        assert_eq!(rels[1].target_entity_id, "metron-creator-11");
        assert_eq!(rels[1].strength, 1.00);
    }

    #[test]
    fn test_attributes_from_keywords() {
        let attrs = extract_attributes(&superman().desc);
        let names: Vec<(&str, &str)> = attrs.iter().map(|a| (a.name.as_str(), a.level.as_str())).collect();
        assert_eq!(
            names,
            vec![
                ("Super", "secondary"),
                ("Strength", "secondary"),
                ("Flight", "secondary"),
                ("Vulnerable", "primary"),
                ("Kryptonite", "primary"),
            ]
        );
        assert!(attrs[0].description.starts_with("Extracted from: Possesses super"));
        assert!(attrs[0].description.ends_with("..."));
        assert!(extract_attributes("").is_empty());
    }
}
