//! Record instances, dirty tracking and change history.

mod history;
mod instance;
mod snapshot;

pub use history::{project, project_array, project_object, project_scalar, ChangeRecord, FieldChange};
pub use instance::{Record, SCORE_KEY};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use crate::schema::{FieldDescriptor, FieldType, ModelSchema};
    use crate::types::Value;
    use std::sync::Arc;

    fn schema() -> Arc<ModelSchema> {
        Arc::new(
            ModelSchema::builder("users")
                .primary_key("userId")
                .field(FieldDescriptor::new("userId", FieldType::String))
                .field(FieldDescriptor::new("name", FieldType::String).required().tag("card"))
                .field(FieldDescriptor::new("rating", FieldType::Int).default_value(0))
                .field(FieldDescriptor::new("password", FieldType::String).hidden())
                .field(FieldDescriptor::new("tags", FieldType::Array))
                .field(
                    FieldDescriptor::new("city", FieldType::String)
                        .format(|record, field, _| {
                            Value::from(format!("~{}", record.get(field).and_then(Value::as_str).unwrap_or("")))
                        }),
                )
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_new_record_takes_defaults() {
        let record = Record::new(schema(), doc! { "name" => "Ben", "rating" => "12abc" });
        assert!(record.is_new());
        assert_eq!(record.get("name"), Some(&Value::from("Ben")));
        assert_eq!(record.get("rating"), Some(&Value::Int(12)));
        assert_eq!(record.get("tags"), Some(&Value::Array(vec![])));
        assert_eq!(record.id(), &Value::Null);
        assert_eq!(record.get("unknown"), None);
    }

    #[test]
    fn test_snapshots_are_independent_copies() {
        let mut record = Record::new(schema(), doc! { "tags" => vec!["a"] });
        record
            .get_mut("tags")
            .and_then(Value::as_array_mut)
            .unwrap()
            .push("b".into());
        assert_eq!(record.snapshot_value("tags"), Some(&Value::from(vec!["a"])));
        assert_eq!(record.snapshot_update_value("tags"), Some(&Value::from(vec!["a"])));
        assert_eq!(record.snapshot_value("nope"), None);
    }

    #[test]
    fn test_set_rejects_unknown_field() {
        let mut record = Record::new(schema(), doc! {});
        let err = record.set("nickname", "x").unwrap_err();
        assert_eq!(err.field(), Some("nickname"));
    }

    #[test]
    fn test_mark_dirty_deduplicates() {
        let mut record = Record::new(schema(), doc! {});
        record.mark_dirty(&["name", "", "rating", "name"]);
        assert_eq!(record.changed_fields(), &["name".to_string(), "rating".to_string()]);
    }

    #[test]
    fn test_view_filters_by_tag_and_hidden() {
        let record = Record::new(
            schema(),
            doc! { "name" => "Ben", "password" => "secret", "city" => "Riga" },
        );
        let view = record.to_view(None, true);
        assert!(!view.contains_key("password"));
        assert_eq!(view.get("city"), Some(&Value::from("~Riga")));

        let card = record.to_view(Some(&["card"]), true);
        assert_eq!(card.keys().collect::<Vec<_>>(), vec!["name"]);

        let hidden = record.to_view(Some(&["hidden"]), false);
        assert_eq!(hidden.keys().collect::<Vec<_>>(), vec!["password"]);

        let ints = record.to_view(Some(&["int"]), true);
        assert_eq!(ints.keys().collect::<Vec<_>>(), vec!["rating"]);
    }

    #[test]
    fn test_display_is_default_view_json() {
        let record = Record::new(schema(), doc! { "userId" => "u1", "name" => "Ben" });
        assert_eq!(
            record.to_string(),
            r#"{"userId":"u1","name":"Ben","rating":0,"tags":[],"city":null}"#
        );
    }
}
