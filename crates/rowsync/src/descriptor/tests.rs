use super::*;
use crate::persisted::{FieldDecl, Values};
use crate::value::{Element, Value};
use std::sync::Barrier;

struct Account;

impl Persisted for Account {
    fn declaration() -> TypeDecl {
        TypeDecl::new("UserAccount")
            .field(FieldDecl::new("id", Kind::Int64).nullable().primary_key())
            .field(FieldDecl::new("emailAddress", Kind::Text).unique().varchar(128))
            .field(FieldDecl::new("cache", Kind::Document).transient())
            .field(FieldDecl::new("tags", Kind::Set(Element::Text)).nullable())
            .field(FieldDecl::new("createdAt", Kind::Timestamp))
    }

    fn to_values(&self) -> Vec<Value> {
        Vec::new()
    }

    fn from_values(_values: Values<'_>) -> Result<Self> {
        Ok(Account)
    }
}

#[test]
fn test_build_translates_and_skips_transient() {
    let d = TypeDescriptor::build(Account::declaration()).unwrap();
    assert_eq!(d.table, "user_account");
    assert_eq!(
        d.column_names(),
        vec!["id", "email_address", "tags", "created_at"]
    );
    let (index, pk) = d.primary_key().unwrap();
    assert_eq!(index, 0);
    assert!(!pk.nullable, "primary keys are never nullable");
    assert_eq!(d.unique_key(), &[1]);
}

#[test]
fn test_wanted_table() {
    let d = TypeDescriptor::build(Account::declaration()).unwrap();
    insta::assert_snapshot!(d.wanted_table().to_create_table_sql(), @r#"
    CREATE TABLE "user_account" (
        "id" bigserial PRIMARY KEY NOT NULL,
        "email_address" varchar(128) NOT NULL,
        "tags" text[],
        "created_at" timestamptz NOT NULL
    );
    "#);
}

#[test]
fn test_physical_types() {
    let ty = |kind: Kind| {
        TypeDescriptor::build(TypeDecl::new("T").field(FieldDecl::new("f", kind)))
            .unwrap()
            .columns[0]
            .physical_type()
    };
    assert_eq!(ty(Kind::Char), "char(1)");
    assert_eq!(ty(Kind::Int32), "int");
    assert_eq!(ty(Kind::Bool), "bool");
    assert_eq!(ty(Kind::Duration), "interval");
    assert_eq!(ty(Kind::List(Element::Int64)), "bigint[]");
    assert_eq!(ty(Kind::Enumerated(&["A", "B"])), "text");
    assert_eq!(ty(Kind::Document), "jsonb");
}

#[test]
fn test_two_primary_keys_rejected() {
    let decl = TypeDecl::new("T")
        .field(FieldDecl::new("a", Kind::Int64).primary_key())
        .field(FieldDecl::new("b", Kind::Int64).primary_key());
    let err = TypeDescriptor::build(decl).unwrap_err();
    assert!(matches!(err, Error::ContractViolation(m) if m.contains("primary key")));
}

#[test]
fn test_colliding_column_names_rejected() {
    let decl = TypeDecl::new("T")
        .field(FieldDecl::new("userName", Kind::Text))
        .field(FieldDecl::new("user_name", Kind::Text));
    assert!(matches!(
        TypeDescriptor::build(decl),
        Err(Error::ContractViolation(_))
    ));
}

#[test]
fn test_empty_class_unique_key_rejected() {
    let decl = TypeDecl::new("T")
        .field(FieldDecl::new("a", Kind::Text))
        .unique_key(&[]);
    assert!(matches!(
        TypeDescriptor::build(decl),
        Err(Error::ContractViolation(_))
    ));
}

#[test]
fn test_unknown_class_unique_key_rejected() {
    let decl = TypeDecl::new("T")
        .field(FieldDecl::new("a", Kind::Text))
        .unique_key(&["missing"]);
    assert!(matches!(
        TypeDescriptor::build(decl),
        Err(Error::ContractViolation(m)) if m.contains("missing")
    ));
}

#[test]
fn test_class_unique_key_wins_over_field_marker() {
    let decl = TypeDecl::new("Translation")
        .field(FieldDecl::new("slug", Kind::Text).unique())
        .field(FieldDecl::new("productId", Kind::Int64))
        .field(FieldDecl::new("locale", Kind::Text))
        .unique_key(&["productId", "locale"]);
    let d = TypeDescriptor::build(decl).unwrap();
    assert_eq!(d.require_unique_key().unwrap(), &[1, 2]);
}

#[test]
fn test_first_unique_field_is_the_conflict_target() {
    let decl = TypeDecl::new("Member")
        .field(FieldDecl::new("id", Kind::Int64).nullable().primary_key())
        .field(FieldDecl::new("email", Kind::Text).unique())
        .field(FieldDecl::new("username", Kind::Text).unique());
    let d = TypeDescriptor::build(decl).unwrap();
    assert_eq!(d.require_unique_key().unwrap(), &[1]);
    assert_eq!(d.columns[2].key, KeyRole::Unique);
}

#[test]
fn test_missing_keys_reported_on_demand() {
    let d = TypeDescriptor::build(TypeDecl::new("T").field(FieldDecl::new("a", Kind::Text)))
        .unwrap();
    assert!(d.primary_key().is_none());
    assert!(matches!(
        d.require_primary_key(),
        Err(Error::ContractViolation(_))
    ));
    assert!(matches!(
        d.require_unique_key(),
        Err(Error::ContractViolation(_))
    ));
}

struct Contended;

impl Persisted for Contended {
    fn declaration() -> TypeDecl {
        TypeDecl::new("Contended")
            .field(FieldDecl::new("id", Kind::Int32).primary_key())
            .field(FieldDecl::new("label", Kind::Text))
    }

    fn to_values(&self) -> Vec<Value> {
        Vec::new()
    }

    fn from_values(_values: Values<'_>) -> Result<Self> {
        Ok(Contended)
    }
}

#[test]
fn test_concurrent_first_use_agrees() {
    let barrier = Barrier::new(100);
    let results: Vec<Arc<TypeDescriptor>> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..100)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    descriptor::<Contended>().unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let cached = descriptor::<Contended>().unwrap();
    for d in &results {
        assert_eq!(d.columns, cached.columns);
        assert!(Arc::ptr_eq(d, &cached) || **d == *cached);
    }
}

#[test]
fn test_cache_returns_same_instance() {
    let a = descriptor::<Account>().unwrap();
    let b = descriptor::<Account>().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
}
