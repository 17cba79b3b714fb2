use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Category {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    pub fn apply(&mut self, patch: UpdateCategory) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewCategory {
    #[validate(
        custom(function = "crate::utils::validation::not_blank"),
        length(min = 2, max = 100, message = "Title must be between 2 and 100 characters")
    )]
    pub title: String,
    #[validate(length(max = 1000, message = "Description must be at most 1000 characters"))]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateCategory {
    #[validate(
        custom(function = "crate::utils::validation::not_blank"),
        length(min = 2, max = 100, message = "Title must be between 2 and 100 characters")
    )]
    pub title: Option<String>,
    /// `Some(None)` clears the description.
    #[validate(length(max = 1000, message = "Description must be at most 1000 characters"))]
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "crate::utils::patch::double_option"
    )]
    pub description: Option<Option<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryTestCount {
    pub category: Category,
    pub tests_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_length_bounds() {
        let short = NewCategory {
            title: "P".into(),
            description: None,
        };
        assert!(short.validate().is_err());

        let ok = NewCategory {
            title: "Programming".into(),
            description: Some("Everything about code".into()),
        };
        assert!(ok.validate().is_ok());

        let long = NewCategory {
            title: "x".repeat(101),
            description: None,
        };
        assert!(long.validate().is_err());
    }

    #[test]
    fn description_limit() {
        let payload = UpdateCategory {
            title: None,
            description: Some(Some("d".repeat(1001))),
        };
        let errors = payload.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("description"));
    }

    #[test]
    fn blank_title_rejected_on_update() {
        let payload = UpdateCategory {
            title: Some("    ".into()),
            description: None,
        };
        let errors = payload.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("title"));
    }

    #[test]
    fn null_description_clears_it() {
        let now = Utc::now();
        let mut category = Category {
            id: Uuid::new_v4(),
            title: "Programming".into(),
            description: Some("Everything about code".into()),
            created_at: now,
            updated_at: now,
        };
        let patch: UpdateCategory =
            serde_json::from_value(serde_json::json!({ "description": null })).unwrap();
        category.apply(patch);
        assert_eq!(category.description, None);
        assert_eq!(category.title, "Programming");
    }
}
