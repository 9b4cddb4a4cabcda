use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: i64,
    /// Machine name used in URLs, unique.
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct NewCategory {
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryView {
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
}

impl From<&Category> for CategoryView {
    fn from(category: &Category) -> Self {
        Self {
            name: category.name.clone(),
            display_name: category.display_name.clone(),
            description: category.description.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_serializes_public_fields_only() {
        let category = Category {
            id: 4,
            name: "science".into(),
            display_name: "Science".into(),
            description: Some("Research news".into()),
            created_at: chrono::NaiveDate::from_ymd_opt(2024, 5, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .unwrap(),
        };
        let json = serde_json::to_value(CategoryView::from(&category)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "science",
                "display_name": "Science",
                "description": "Research news"
            })
        );
    }
}
