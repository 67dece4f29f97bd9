use super::*;
use crate::persisted::{FieldDecl, TypeDecl};
use crate::value::{Element, Kind};
use chrono::TimeDelta;

fn product() -> TypeDescriptor {
    TypeDescriptor::build(
        TypeDecl::new("Product")
            .field(FieldDecl::new("id", Kind::Int64).nullable().primary_key())
            .field(FieldDecl::new("handle", Kind::Text).unique())
            .field(FieldDecl::new("title", Kind::Text).nullable())
            .field(FieldDecl::new("tags", Kind::Set(Element::Text)).nullable())
            .field(FieldDecl::new("shelfLife", Kind::Duration).nullable()),
    )
    .unwrap()
}

fn translation() -> TypeDescriptor {
    TypeDescriptor::build(
        TypeDecl::new("ProductTranslation")
            .field(FieldDecl::new("productId", Kind::Int64))
            .field(FieldDecl::new("locale", Kind::Text))
            .field(FieldDecl::new("title", Kind::Text).nullable())
            .unique_key(&["productId", "locale"]),
    )
    .unwrap()
}

#[test]
fn test_insert_skips_absent_fields() {
    let stmt = insert(
        &product(),
        vec![
            Value::Null,
            "widget".into(),
            Value::Null,
            Value::List(vec!["a".into(), "a".into()]),
            TimeDelta::minutes(15).into(),
        ],
    )
    .unwrap();
    insta::assert_snapshot!(stmt.sql, @r#"INSERT INTO "product" ("handle", "tags", "shelf_life") VALUES ($1, $2, $3) RETURNING *"#);
    assert_eq!(
        stmt.params,
        vec![
            Value::from("widget"),
            Value::Set(vec![Value::from("a")]),
            Value::Duration(TimeDelta::minutes(15)),
        ]
    );
}

#[test]
fn test_insert_with_nothing_present() {
    let stmt = insert(&product(), vec![Value::Null; 5]).unwrap();
    insta::assert_snapshot!(stmt.sql, @r#"INSERT INTO "product" DEFAULT VALUES RETURNING *"#);
    assert!(stmt.params.is_empty());
}

#[test]
fn test_insert_wrong_arity() {
    let err = insert(&product(), vec![Value::Null]).unwrap_err();
    assert!(matches!(err, Error::ContractViolation(_)));
}

#[test]
fn test_update() {
    let stmt = update(
        &product(),
        vec![
            Value::I64(42),
            "widget".into(),
            "Widget".into(),
            Value::Null,
            Value::Null,
        ],
    )
    .unwrap();
    insta::assert_snapshot!(stmt.sql, @r#"UPDATE "product" SET "handle" = $1, "title" = $2 WHERE "id" = $3 RETURNING *"#);
    assert_eq!(
        stmt.params,
        vec![Value::from("widget"), Value::from("Widget"), Value::I64(42)]
    );
}

#[test]
fn test_update_without_primary_key_value() {
    let err = update(
        &product(),
        vec![Value::Null, "widget".into(), Value::Null, Value::Null, Value::Null],
    )
    .unwrap_err();
    assert!(matches!(err, Error::ContractViolation(m) if m.contains("primary key cannot be null")));
}

#[test]
fn test_update_with_only_the_key() {
    let err = update(&product(), vec![Value::I64(1), Value::Null, Value::Null, Value::Null, Value::Null])
        .unwrap_err();
    assert!(matches!(err, Error::ContractViolation(_)));
}

#[test]
fn test_update_without_declared_key() {
    let err = update(&translation(), vec![Value::I64(1), "en".into(), Value::Null]).unwrap_err();
    assert!(matches!(err, Error::ContractViolation(m) if m.contains("no primary key")));
}

#[test]
fn test_upsert_single_unique_column() {
    let stmt = upsert(
        &product(),
        vec![Value::Null, "widget".into(), "Widget".into(), Value::Null, Value::Null],
    )
    .unwrap();
    insta::assert_snapshot!(stmt.sql, @r#"INSERT INTO "product" ("handle", "title") VALUES ($1, $2) ON CONFLICT ("handle") DO UPDATE SET "title" = EXCLUDED."title" RETURNING *"#);
}

#[test]
fn test_upsert_with_several_unique_fields() {
    let member = TypeDescriptor::build(
        TypeDecl::new("Member")
            .field(FieldDecl::new("id", Kind::Int64).nullable().primary_key())
            .field(FieldDecl::new("email", Kind::Text).unique())
            .field(FieldDecl::new("username", Kind::Text).unique()),
    )
    .unwrap();
    let stmt = upsert(&member, vec![Value::Null, "a@b.c".into(), "ab".into()]).unwrap();
    insta::assert_snapshot!(stmt.sql, @r#"INSERT INTO "member" ("email", "username") VALUES ($1, $2) ON CONFLICT ("email") DO UPDATE SET "username" = EXCLUDED."username" RETURNING *"#);
    assert!(insert(&member, vec![Value::Null, "a@b.c".into(), "ab".into()]).is_ok());
}

#[test]
fn test_upsert_composite_key() {
    let stmt = upsert(
        &translation(),
        vec![Value::I64(7), "fr".into(), "Bidule".into()],
    )
    .unwrap();
    insta::assert_snapshot!(stmt.sql, @r#"INSERT INTO "product_translation" ("product_id", "locale", "title") VALUES ($1, $2, $3) ON CONFLICT ("product_id", "locale") DO UPDATE SET "title" = EXCLUDED."title" RETURNING *"#);
}

#[test]
fn test_upsert_only_unique_columns_present() {
    let stmt = upsert(&translation(), vec![Value::I64(7), "fr".into(), Value::Null]).unwrap();
    insta::assert_snapshot!(stmt.sql, @r#"INSERT INTO "product_translation" ("product_id", "locale") VALUES ($1, $2) ON CONFLICT ("product_id", "locale") DO UPDATE SET "product_id" = EXCLUDED."product_id" RETURNING *"#);
}

#[test]
fn test_upsert_missing_unique_value() {
    let err = upsert(&translation(), vec![Value::I64(7), Value::Null, "x".into()]).unwrap_err();
    assert!(matches!(err, Error::ContractViolation(m) if m.contains("locale")));
}

#[test]
fn test_delete_by_id() {
    let stmt = delete_by_id(&product(), Value::I64(3)).unwrap();
    insta::assert_snapshot!(stmt.sql, @r#"DELETE FROM "product" WHERE "id" = $1"#);
    assert!(matches!(
        delete_by_id(&product(), Value::Null),
        Err(Error::ContractViolation(_))
    ));
}

#[test]
fn test_primary_key_value() {
    let d = product();
    let values = vec![Value::I64(9), "h".into(), Value::Null, Value::Null, Value::Null];
    assert_eq!(primary_key_value(&d, &values).unwrap(), Value::I64(9));
    assert!(primary_key_value(&d, &[Value::Null]).is_err());
}

#[test]
fn test_selects() {
    let d = product();
    insta::assert_snapshot!(select_by_id(&d, Value::I32(1)).unwrap().sql, @r#"SELECT * FROM "product" WHERE "id" = $1"#);
    insta::assert_snapshot!(select_all(&d).sql, @r#"SELECT * FROM "product""#);

    let stmt = select_where(&d, "handle = $1 AND title IS NOT NULL", &["widget".into()]);
    insta::assert_snapshot!(stmt.sql, @r#"SELECT * FROM "product" WHERE handle = $1 AND title IS NOT NULL"#);
    assert_eq!(stmt.params, vec![Value::from("widget")]);
}

#[test]
fn test_select_by_id_widens_key() {
    let stmt = select_by_id(&product(), Value::I32(1)).unwrap();
    assert_eq!(stmt.params, vec![Value::I64(1)]);
}

#[test]
fn test_update_where() {
    let stmt = update_where(&product(), r#"SET "title" = $1 WHERE "handle" = $2"#, &[
        "New".into(),
        "widget".into(),
    ]);
    insta::assert_snapshot!(stmt.sql, @r#"UPDATE "product" SET "title" = $1 WHERE "handle" = $2"#);
}

#[test]
fn test_kind_mismatch_fails_before_sql() {
    let err = insert(
        &product(),
        vec![Value::Null, Value::I32(1), Value::Null, Value::Null, Value::Null],
    )
    .unwrap_err();
    assert!(matches!(err, Error::UnsupportedMapping { .. }));
}
