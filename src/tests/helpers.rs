//! Shared fixtures for lens tests

use crate::descriptor::{FieldDescriptor, MethodSignature, Reflect, TypeDescriptor};
use std::collections::BTreeMap;

pub const MODELS: &str = "github.com/acme/shop/models";
pub const BILLING: &str = "github.com/acme/shop/billing";
pub const VENDOR: &str = "github.com/other/lib";

/// Initialize logging for tests
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

pub fn qualified(domain: &str, name: &str) -> String {
    format!("{domain}::{name}")
}

pub struct User;

impl Reflect for User {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::record("User", MODELS)
            .field(FieldDescriptor::of::<String>("ID").tags(r#"json:"id" custom:"x""#))
            .field(FieldDescriptor::of::<Option<Box<Profile>>>("Profile"))
            .field(FieldDescriptor::of::<Vec<Order>>("Orders"))
            .field(FieldDescriptor::of::<Vec<String>>("Tags"))
            .field(FieldDescriptor::of::<String>("password").private())
            .method(MethodSignature::new("clone").by_ref().returns(["Self"]))
            .capability("Display")
    }
}

pub struct Profile;

impl Reflect for Profile {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::record("Profile", MODELS)
            .field(FieldDescriptor::of::<String>("Bio").tag("json", "bio"))
            .field(FieldDescriptor::of::<Option<Box<Address>>>("Address"))
    }
}

pub struct Address;

impl Reflect for Address {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::record("Address", MODELS)
            .field(FieldDescriptor::of::<String>("Street"))
            .field(FieldDescriptor::of::<String>("City"))
    }
}

pub struct Order;

impl Reflect for Order {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::record("Order", MODELS)
            .field(FieldDescriptor::of::<String>("OrderID"))
            .field(FieldDescriptor::of::<Vec<OrderItem>>("Items"))
    }
}

pub struct OrderItem;

impl Reflect for OrderItem {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::record("OrderItem", MODELS)
            .field(FieldDescriptor::of::<String>("SKU"))
            .field(FieldDescriptor::of::<u32>("Quantity"))
    }
}

/// Self-referential tree node.
pub struct Node;

impl Reflect for Node {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::record("Node", MODELS)
            .field(FieldDescriptor::of::<String>("Value"))
            .field(FieldDescriptor::of::<Option<Box<Node>>>("Parent"))
            .field(FieldDescriptor::of::<Vec<Node>>("Children"))
    }
}

/// `A` and `B` point at each other.
pub struct A;

impl Reflect for A {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::record("A", MODELS).field(FieldDescriptor::of::<Option<Box<B>>>("B"))
    }
}

pub struct B;

impl Reflect for B {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::record("B", MODELS).field(FieldDescriptor::of::<Vec<A>>("As"))
    }
}

/// Shares the `github.com/acme/shop` root with the models but not the exact domain.
pub struct Invoice;

impl Reflect for Invoice {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::record("Invoice", BILLING)
            .field(FieldDescriptor::of::<String>("Number"))
            .field(FieldDescriptor::of::<Option<Box<Timestamp>>>("IssuedAt"))
    }
}

/// Declared outside the shop root.
pub struct Timestamp;

impl Reflect for Timestamp {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::record("Timestamp", VENDOR).field(FieldDescriptor::of::<i64>("Seconds"))
    }
}

/// References both an adjacent-domain and a foreign-domain record.
pub struct Customer;

impl Reflect for Customer {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::record("Customer", MODELS)
            .field(FieldDescriptor::of::<String>("Name"))
            .field(FieldDescriptor::of::<BTreeMap<String, Invoice>>("Invoices"))
            .field(FieldDescriptor::of::<Timestamp>("Since"))
    }
}
