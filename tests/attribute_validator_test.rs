// ==========================================
// AttributeValidator 集成测试
// ==========================================
// 测试目标: 长度上限、数值、选项自动创建与记忆、未知字段处理
// ==========================================


use import_pipeline::domain::attribute::ENTITY_CATALOG_PRODUCT;
use import_pipeline::domain::types::Severity;
use import_pipeline::importer::{
    AttributeValidator, ImportError, InMemoryEntityMetadata, ValidationOptions,
};
use import_pipeline::logging;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use test_helpers::{create_test_db, open_test_connection, product_metadata};

fn auto_create_options() -> ValidationOptions {
    ValidationOptions {
        allow_auto_create_options: true,
        ..ValidationOptions::default()
    }
}

fn setup() -> (
    tempfile::NamedTempFile,
    rusqlite::Connection,
    Arc<InMemoryEntityMetadata>,
    AttributeValidator,
) {
    logging::init_test();
    let (temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let conn = open_test_connection(&db_path).expect("Failed to open db");
    let metadata = Arc::new(product_metadata());
    let validator = AttributeValidator::new(metadata.clone());
    (temp_file, conn, metadata, validator)
}

// ==========================================
// 长度 / 数值
// ==========================================

#[test]
fn test_varchar_length_limit_is_exclusive() {
    let (_temp_file, conn, _metadata, mut validator) = setup();
    let options = ValidationOptions::default();

    let ok = Value::String("a".repeat(254));
    let too_long = Value::String("a".repeat(255));

    assert!(validator
        .validate(&conn, ENTITY_CATALOG_PRODUCT, "name", &ok, 0, &options)
        .is_ok());
    let err = validator
        .validate(&conn, ENTITY_CATALOG_PRODUCT, "name", &too_long, 0, &options)
        .unwrap_err();
    assert!(matches!(err, ImportError::InvalidValue { .. }));
    assert!(!err.is_fatal());
}

#[test]
fn test_text_length_limit_is_exclusive() {
    let (_temp_file, conn, _metadata, mut validator) = setup();
    let options = ValidationOptions::default();

    let ok = Value::String("a".repeat(65_535));
    let too_long = Value::String("a".repeat(65_536));

    assert!(validator
        .validate(&conn, ENTITY_CATALOG_PRODUCT, "description", &ok, 0, &options)
        .is_ok());
    let err = validator
        .validate(&conn, ENTITY_CATALOG_PRODUCT, "description", &too_long, 0, &options)
        .unwrap_err();
    assert!(matches!(err, ImportError::InvalidValue { .. }));
}

#[test]
fn test_decimal_values() {
    let (_temp_file, conn, _metadata, mut validator) = setup();
    let options = ValidationOptions::default();

    for valid in [json!("12.5"), json!(7), json!(" 3.25 "), json!(null)] {
        assert!(
            validator
                .validate(&conn, ENTITY_CATALOG_PRODUCT, "price", &valid, 0, &options)
                .is_ok(),
            "{} 应为合法 decimal",
            valid
        );
    }

    assert!(validator
        .validate(&conn, ENTITY_CATALOG_PRODUCT, "price", &json!("12,5 EUR"), 0, &options)
        .is_err());
}

#[test]
fn test_invalid_result_is_memoized() {
    let (_temp_file, conn, _metadata, mut validator) = setup();
    let options = ValidationOptions::default();

    let value = json!("abc");
    assert!(validator
        .validate(&conn, ENTITY_CATALOG_PRODUCT, "status", &value, 0, &options)
        .is_err());
    assert!(validator
        .validate(&conn, ENTITY_CATALOG_PRODUCT, "status", &value, 0, &options)
        .is_err());
    assert_eq!(validator.memo_len(), 1);

    validator.reset();
    assert_eq!(validator.memo_len(), 0);
}

#[test]
fn test_static_column_uses_native_type() {
    let (_temp_file, conn, _metadata, mut validator) = setup();
    let options = ValidationOptions::default();

    assert!(validator
        .validate(&conn, ENTITY_CATALOG_PRODUCT, "created_at", &json!("2026-03-01 08:30:00"), 0, &options)
        .is_ok());
    assert!(validator
        .validate(&conn, ENTITY_CATALOG_PRODUCT, "created_at", &json!("next tuesday"), 0, &options)
        .is_err());
    assert!(validator
        .validate(&conn, ENTITY_CATALOG_PRODUCT, "sku", &json!("SKU-001"), 0, &options)
        .is_ok());
}

#[test]
fn test_non_scalar_value_is_invalid_shape() {
    let (_temp_file, conn, _metadata, mut validator) = setup();

    let err = validator
        .validate(
            &conn,
            ENTITY_CATALOG_PRODUCT,
            "name",
            &json!(["a", "b"]),
            0,
            &ValidationOptions::default(),
        )
        .unwrap_err();
    assert!(matches!(err, ImportError::InvalidShape { .. }));
}

// ==========================================
// 选项
// ==========================================

#[test]
fn test_existing_option_by_label_id_or_key() {
    let (_temp_file, conn, metadata, mut validator) = setup();
    let options = ValidationOptions::default();

    for value in [json!("Red"), json!("101"), json!(100), json!("blue"), json!("")] {
        assert!(
            validator
                .validate(&conn, ENTITY_CATALOG_PRODUCT, "color", &value, 0, &options)
                .is_ok(),
            "{} 应匹配已有选项",
            value
        );
    }
    assert!(metadata.option_creation_attempts().is_empty());
}

#[test]
fn test_auto_create_happens_once_per_value() {
    let (_temp_file, conn, metadata, mut validator) = setup();
    let options = auto_create_options();

    let value = json!("Green");
    assert!(validator
        .validate(&conn, ENTITY_CATALOG_PRODUCT, "color", &value, 2, &options)
        .is_ok());
    assert!(validator
        .validate(&conn, ENTITY_CATALOG_PRODUCT, "color", &value, 2, &options)
        .is_ok());

    let attempts = metadata.option_creation_attempts();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].value, "Green");
    assert_eq!(attempts[0].store_id, 2);
    assert_eq!(attempts[0].sort_order, 0);
    assert!(!attempts[0].test);
}

#[test]
fn test_auto_create_in_test_mode_is_flagged() {
    let (_temp_file, conn, metadata, mut validator) = setup();
    let options = ValidationOptions {
        test: true,
        ..auto_create_options()
    };

    assert!(validator
        .validate(&conn, ENTITY_CATALOG_PRODUCT, "tags", &json!("New, Limited"), 0, &options)
        .is_ok());

    let attempts = metadata.option_creation_attempts();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].value, "Limited");
    assert!(attempts[0].test);
}

#[test]
fn test_multiselect_checks_every_token() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let conn = open_test_connection(&db_path).expect("Failed to open db");
    let metadata = Arc::new(product_metadata().with_rejected_option_creation());
    let mut validator = AttributeValidator::new(metadata.clone());

    let err = validator
        .validate(&conn, ENTITY_CATALOG_PRODUCT, "tags", &json!("Foo, Sale, Bar"), 0, &auto_create_options())
        .unwrap_err();
    assert!(matches!(err, ImportError::OptionCreation { .. }));

    let attempted: Vec<String> = metadata
        .option_creation_attempts()
        .into_iter()
        .map(|a| a.value)
        .collect();
    assert_eq!(attempted, vec!["Foo".to_string(), "Bar".to_string()]);
}

#[test]
fn test_multiselect_creates_each_missing_token() {
    let (_temp_file, conn, metadata, mut validator) = setup();

    assert!(validator
        .validate(&conn, ENTITY_CATALOG_PRODUCT, "tags", &json!("Green, New, Teal"), 0, &auto_create_options())
        .is_ok());
    assert_eq!(metadata.option_creation_attempts().len(), 2);
}

#[test]
fn test_missing_option_without_auto_create_is_invalid() {
    let (_temp_file, conn, metadata, mut validator) = setup();

    let err = validator
        .validate(
            &conn,
            ENTITY_CATALOG_PRODUCT,
            "color",
            &json!("Purple"),
            0,
            &ValidationOptions::default(),
        )
        .unwrap_err();
    assert!(matches!(err, ImportError::InvalidValue { .. }));
    assert!(metadata.option_creation_attempts().is_empty());
}

#[test]
fn test_rejected_option_creation_is_element_error() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let conn = open_test_connection(&db_path).expect("Failed to open db");
    let metadata = Arc::new(product_metadata().with_rejected_option_creation());
    let mut validator = AttributeValidator::new(metadata.clone());

    let err = validator
        .validate(&conn, ENTITY_CATALOG_PRODUCT, "color", &json!("Teal"), 0, &auto_create_options())
        .unwrap_err();
    assert!(matches!(err, ImportError::OptionCreation { .. }));
    assert!(!err.is_fatal());
    assert_eq!(metadata.option_creation_attempts().len(), 1);
}

// ==========================================
// 未知字段 / 特殊字段
// ==========================================

#[test]
fn test_unknown_field_hard_error_by_default() {
    let (_temp_file, conn, _metadata, mut validator) = setup();

    let err = validator
        .validate(
            &conn,
            ENTITY_CATALOG_PRODUCT,
            "shoe_size",
            &json!("42"),
            0,
            &ValidationOptions::default(),
        )
        .unwrap_err();
    assert!(matches!(err, ImportError::UnknownField { ignorable: false, .. }));
    assert_eq!(err.severity(), Severity::Error);
    assert_eq!(validator.memo_len(), 0);
}

#[test]
fn test_unknown_field_warn_only_is_removed_from_element() {
    let (_temp_file, conn, _metadata, mut validator) = setup();
    let options = ValidationOptions {
        warn_on_unknown_fields: true,
        ..ValidationOptions::default()
    };

    let mut element = Map::new();
    element.insert("sku".to_string(), json!("SKU-1"));
    element.insert("shoe_size".to_string(), json!("42"));
    element.insert("status".to_string(), json!("enabled"));

    let errors = validator
        .validate_element(&conn, ENTITY_CATALOG_PRODUCT, &mut element, 0, &options)
        .expect("validation should not fail fatally");

    assert!(!element.contains_key("shoe_size"));
    assert!(element.contains_key("sku"));
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, "status");
}

#[test]
fn test_special_fields_bypass_metadata() {
    let (_temp_file, conn, _metadata, mut validator) = setup();
    let options = ValidationOptions::default()
        .with_special_field("position", "int")
        .with_special_field("label", "string");

    assert!(validator
        .validate(&conn, ENTITY_CATALOG_PRODUCT, "position", &json!("12"), 0, &options)
        .is_ok());
    assert!(matches!(
        validator
            .validate(&conn, ENTITY_CATALOG_PRODUCT, "position", &json!("12abc"), 0, &options)
            .unwrap_err(),
        ImportError::InvalidSpecialValue { .. }
    ));
    assert!(validator
        .validate(&conn, ENTITY_CATALOG_PRODUCT, "label", &json!(3.5), 0, &options)
        .is_ok());
}

#[test]
fn test_date_special_fields_are_rejected() {
    let (_temp_file, conn, _metadata, mut validator) = setup();
    let options = ValidationOptions::default()
        .with_special_field("news_from", "date")
        .with_special_field("updated_at", "datetime");

    for (code, value) in [
        ("news_from", json!("2026-01-01")),
        ("updated_at", json!("2026-01-01 10:00:00")),
    ] {
        let err = validator
            .validate(&conn, ENTITY_CATALOG_PRODUCT, code, &value, 0, &options)
            .unwrap_err();
        assert!(matches!(err, ImportError::InvalidSpecialValue { .. }));
        assert!(!err.is_fatal());
    }
}
