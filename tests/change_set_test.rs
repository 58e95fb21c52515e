// ==========================================
// ChangeSetBuilder 集成测试
// ==========================================
// 测试目标: 门店展开、默认作用域值、全局字段、忽略字段
// ==========================================


use import_pipeline::domain::attribute::{ChangeInstruction, ENTITY_CATALOG_PRODUCT};
use import_pipeline::importer::{ChangeSetBuilder, ChangeSetOptions, ImportError};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use test_helpers::{
    create_test_db, open_test_connection, product_metadata, PRODUCT_DECIMAL_TABLE,
    PRODUCT_ENTITY_TABLE, PRODUCT_VARCHAR_TABLE,
};

fn setup(price_scope_global: bool) -> (tempfile::NamedTempFile, rusqlite::Connection, ChangeSetBuilder) {
    let (temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let conn = open_test_connection(&db_path).expect("Failed to open db");
    let builder = ChangeSetBuilder::new(Arc::new(product_metadata()), price_scope_global);
    (temp_file, conn, builder)
}

fn store_ids(instructions: &[ChangeInstruction]) -> Vec<Option<i64>> {
    instructions.iter().map(ChangeInstruction::store_id).collect()
}

fn store_options() -> ChangeSetOptions {
    ChangeSetOptions {
        add_store_value: true,
        ..ChangeSetOptions::default()
    }
}

#[test]
fn test_website_scope_fans_out_to_sibling_stores() {
    let (_temp_file, conn, mut builder) = setup(false);

    let instructions = builder
        .build(&conn, ENTITY_CATALOG_PRODUCT, "price", &json!("19.99"), 7, 2, &store_options())
        .expect("build should succeed");

    assert_eq!(store_ids(&instructions), vec![Some(1), Some(2), Some(3)]);
    assert!(instructions.iter().all(|i| i.table() == PRODUCT_DECIMAL_TABLE));
}

#[test]
fn test_admin_value_appended_when_requested() {
    let (_temp_file, conn, mut builder) = setup(false);
    let options = ChangeSetOptions {
        add_admin_value: true,
        ..store_options()
    };

    let instructions = builder
        .build(&conn, ENTITY_CATALOG_PRODUCT, "price", &json!("19.99"), 7, 2, &options)
        .expect("build should succeed");

    assert_eq!(
        store_ids(&instructions),
        vec![Some(1), Some(2), Some(3), Some(0)]
    );
    assert_eq!(instructions[3].value(), &json!(19.99));
}

#[test]
fn test_store_scope_writes_single_store_row() {
    let (_temp_file, conn, mut builder) = setup(false);

    let instructions = builder
        .build(&conn, ENTITY_CATALOG_PRODUCT, "name", &json!("Lamp"), 7, 4, &store_options())
        .expect("build should succeed");

    assert_eq!(store_ids(&instructions), vec![Some(4)]);
    assert_eq!(instructions[0].table(), PRODUCT_VARCHAR_TABLE);
}

#[test]
fn test_default_store_writes_admin_row_only() {
    let (_temp_file, conn, mut builder) = setup(false);

    let instructions = builder
        .build(&conn, ENTITY_CATALOG_PRODUCT, "name", &json!("Lamp"), 7, 0, &store_options())
        .expect("build should succeed");

    assert_eq!(store_ids(&instructions), vec![Some(0)]);
}

#[test]
fn test_admin_value_override_and_empty_admin_value() {
    let (_temp_file, conn, mut builder) = setup(false);

    let mut defaults = serde_json::Map::new();
    defaults.insert("name".to_string(), json!("Lamp (default)"));
    let options = ChangeSetOptions {
        add_admin_value: true,
        default_values: defaults,
        ..store_options()
    };
    let instructions = builder
        .build(&conn, ENTITY_CATALOG_PRODUCT, "name", &json!("Lampe"), 7, 4, &options)
        .expect("build should succeed");
    assert_eq!(instructions.len(), 2);
    assert_eq!(instructions[0].value(), &json!("Lampe"));
    assert_eq!(instructions[1].value(), &json!("Lamp (default)"));

    let options = ChangeSetOptions {
        add_admin_value: true,
        add_empty_admin_value: true,
        ..store_options()
    };
    let instructions = builder
        .build(&conn, ENTITY_CATALOG_PRODUCT, "name", &json!("Lampe"), 7, 4, &options)
        .expect("build should succeed");
    assert_eq!(instructions[1].store_id(), Some(0));
    assert!(instructions[1].value().is_null());
}

#[test]
fn test_admin_override_is_written_as_given() {
    let (_temp_file, conn, mut builder) = setup(false);

    let mut defaults = serde_json::Map::new();
    defaults.insert("price".to_string(), json!("19.999999"));
    let options = ChangeSetOptions {
        add_admin_value: true,
        default_values: defaults,
        ..store_options()
    };
    let instructions = builder
        .build(&conn, ENTITY_CATALOG_PRODUCT, "price", &json!("18.5"), 7, 2, &options)
        .expect("build should succeed");

    assert_eq!(
        store_ids(&instructions),
        vec![Some(1), Some(2), Some(3), Some(0)]
    );
    assert_eq!(instructions[0].value(), &json!(18.5));
    assert_eq!(instructions[3].value(), &json!("19.999999"));
}

#[test]
fn test_global_field_ignores_store_request() {
    let (_temp_file, conn, mut builder) = setup(false);

    let instructions = builder
        .build(&conn, ENTITY_CATALOG_PRODUCT, "weight", &json!("1.23456"), 7, 2, &store_options())
        .expect("build should succeed");

    assert_eq!(store_ids(&instructions), vec![Some(0)]);
    assert_eq!(instructions[0].value(), &json!(1.2346));
}

#[test]
fn test_price_scope_global_forces_admin_row() {
    let (_temp_file, conn, mut builder) = setup(true);

    let instructions = builder
        .build(&conn, ENTITY_CATALOG_PRODUCT, "price", &json!("5"), 7, 2, &store_options())
        .expect("build should succeed");

    assert_eq!(store_ids(&instructions), vec![Some(0)]);
}

#[test]
fn test_static_field_is_single_row_on_entity_table() {
    let (_temp_file, conn, mut builder) = setup(false);

    let instructions = builder
        .build(&conn, ENTITY_CATALOG_PRODUCT, "sku", &json!("SKU-9"), 7, 2, &store_options())
        .expect("build should succeed");

    assert_eq!(
        instructions,
        vec![ChangeInstruction::Single {
            table: PRODUCT_ENTITY_TABLE.to_string(),
            entity_id: 7,
            column: "sku".to_string(),
            value: json!("SKU-9"),
        }]
    );
}

#[test]
fn test_ignored_and_special_fields() {
    let (_temp_file, conn, mut builder) = setup(false);

    let mut options = store_options();
    options.ignored_fields = BTreeSet::from(["name".to_string()]);
    options
        .special_fields
        .insert("type_id".to_string(), "string".to_string());

    let ignored = builder
        .build(&conn, ENTITY_CATALOG_PRODUCT, "name", &json!("Lamp"), 7, 2, &options)
        .expect("build should succeed");
    assert!(ignored.is_empty());

    let special = builder
        .build(&conn, ENTITY_CATALOG_PRODUCT, "type_id", &json!("bundle"), 7, 2, &options)
        .expect("build should succeed");
    assert_eq!(special.len(), 1);
    assert_eq!(special[0].table(), PRODUCT_ENTITY_TABLE);
}

#[test]
fn test_unknown_field_fails() {
    let (_temp_file, conn, mut builder) = setup(false);

    let err = builder
        .build(&conn, ENTITY_CATALOG_PRODUCT, "shoe_size", &json!("42"), 7, 0, &store_options())
        .unwrap_err();
    assert!(matches!(err, ImportError::UnknownField { .. }));
}
