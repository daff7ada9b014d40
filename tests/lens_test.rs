//! End-to-end use of the public lens API.

mod common;

use common::*;
use std::{sync::Arc, thread};
use tempfile::TempDir;
use test_log::test;
use typelens::{
    descriptor::{FieldDescriptor, Reflect, TypeDescriptor},
    metadata::RelationKind,
    policy::{document::load_dir, PolicyViolation},
    Lens, LensConfig, LensError,
};

const ORDERS: &str = "github.com/acme/shop/orders";
const CRM: &str = "github.com/acme/shop/crm";

struct Order;

impl Reflect for Order {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::record("Order", ORDERS)
            .field(FieldDescriptor::of::<String>("CreatedAt"))
            .field(FieldDescriptor::of::<Vec<Arc<OrderLine>>>("Lines"))
            .field(
                FieldDescriptor::of::<Option<Box<Customer>>>("Customer")
                    .tags(r#"xml:"customer""#),
            )
    }
}

struct OrderLine;

impl Reflect for OrderLine {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::record("OrderLine", ORDERS)
            .field(FieldDescriptor::of::<u32>("Quantity"))
            .field(FieldDescriptor::of::<Option<Box<Order>>>("Order"))
    }
}

struct Customer;

impl Reflect for Customer {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::record("Customer", CRM)
            .field(FieldDescriptor::of::<String>("FullName"))
    }
}

fn configured_lens(strict: bool) -> Lens {
    let temp_dir = TempDir::new().unwrap();
    let policies = load_dir(create_policy_dir(&temp_dir)).unwrap();
    let lens = Lens::new(LensConfig {
        strict,
        ..Default::default()
    });
    let admin = lens.create_admin().unwrap();
    admin.set_policies(policies).unwrap();
    admin.seal().unwrap();
    lens
}

#[test]
fn test_policies_from_disk_enrich_scanned_metadata() {
    let lens = configured_lens(false);
    let order = lens.scan::<Order>().unwrap();

    // Both documents match `Order`; the later one wins classification, codecs are unioned.
    assert_eq!(order.classification.as_deref(), Some("ledger"));
    assert_eq!(order.codecs, vec!["json", "yaml"]);
    let created = order.field("CreatedAt").unwrap();
    assert_eq!(created.annotation("json"), "created_at");
    assert_eq!(created.annotation("db"), "createdat");
    assert_eq!(
        order.warnings,
        vec![PolicyViolation::ForbiddenTag {
            source_name: "audit/no-xml".to_string(),
            field: "Customer".to_string(),
            tag: "xml".to_string(),
        }]
    );

    let kinds = order
        .relationships
        .iter()
        .map(|r| (r.field.as_str(), r.kind))
        .collect::<Vec<_>>();
    assert_eq!(
        kinds,
        vec![
            ("Lines", RelationKind::Collection),
            ("Customer", RelationKind::Reference)
        ]
    );

    let customer = lens.lookup(&format!("{CRM}::Customer")).unwrap();
    assert_eq!(customer.classification.as_deref(), Some("model"));
    assert_eq!(lens.browse().len(), 3);
}

#[test]
fn test_strict_lens_surfaces_violations() {
    let lens = configured_lens(true);
    let err = lens.scan::<Order>().unwrap_err();
    let LensError::PolicyViolation {
        type_name,
        violations,
    } = err
    else {
        panic!("expected a policy violation");
    };
    assert_eq!(type_name, format!("{ORDERS}::Order"));
    assert_eq!(violations.len(), 1);
    assert!(lens.browse().is_empty());

    // Types without violations still extract.
    assert!(lens.inspect::<Customer>().is_ok());
}

#[test]
fn test_concurrent_inspect_and_scan_settle_on_scan_entries() {
    init_logging();
    let lens = Lens::default();
    let handles = (0..8)
        .map(|i| {
            let lens = lens.clone();
            thread::spawn(move || {
                if i % 2 == 0 {
                    lens.scan::<Order>()
                } else {
                    lens.inspect::<Order>()
                }
            })
        })
        .collect::<Vec<_>>();
    for handle in handles {
        let order = handle.join().unwrap().unwrap();
        assert!(!order.relationships.is_empty());
    }

    assert!(lens.is_sealed());
    assert_eq!(lens.config_session(), 1);
    assert_eq!(lens.browse().len(), 3);

    // Whichever thread stored first, the cache ends up holding the scan result.
    let cached = lens.lookup(&format!("{ORDERS}::Order")).unwrap();
    assert_eq!(cached.relationships.len(), 2);
    let again = lens.scan::<Order>().unwrap();
    assert!(Arc::ptr_eq(&cached, &again));

    // Inspection still only sees edges inside the orders domain.
    let inspected = lens.inspect::<Order>().unwrap();
    let fields = inspected
        .relationships
        .iter()
        .map(|r| r.field.as_str())
        .collect::<Vec<_>>();
    assert_eq!(fields, vec!["Lines"]);
}

#[test]
fn test_lookup_and_export_never_extract() {
    let lens = Lens::default();
    assert!(lens.lookup(&format!("{ORDERS}::Order")).is_none());
    assert!(lens.export_schema().is_empty());
    assert!(!lens.is_sealed());
    assert_eq!(lens.stats().extractions(), 0);
}
