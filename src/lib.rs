//! # typelens
//!
//! Structural metadata for Rust record types: fields, declared types, field annotations,
//! relationships between records, and declarative policies that validate and enrich all of it.
//!
//! ## Overview
//!
//! The type universe of a program is fixed once it starts, so everything the lens extracts is
//! cached permanently. A caller asks for the metadata of a type `T`; on a cache miss the
//! extraction pipeline runs once and the frozen result is stored.
//!
//! ### Key Features
//!
//! - **Descriptor-based introspection**: record types implement [`Reflect`]; standard library
//!   containers are classified automatically
//! - **Relationship discovery**: reference, collection, embedding and map edges, bounded to the
//!   record's domain
//! - **Cycle-safe scans**: recursive extraction of every in-domain reachable record using a
//!   visited set
//! - **Policies**: glob-matched type policies, field tag bundles and rule predicates, loadable
//!   from YAML
//! - **Sealed configuration**: policies are frozen into an immutable pipeline snapshot before
//!   the first extraction
//!
//! ## Architecture
//!
//! - **[`descriptor`]**: [`Reflect`], [`TypeDescriptor`], field and method descriptors
//! - **[`policy`]**: policy data model, [`PolicyEngine`](policy::PolicyEngine), YAML documents
//! - **[`relationship`]**: edge classification and domain scoping
//! - **[`convention`]**: named method-shape and capability contracts
//! - **[`pipeline`]**: the staged extraction state machine
//! - **[`cache`]**: the permanent metadata store
//! - **[`lens`]**: the caller-owned context ([`Lens`]) and its configuration holder ([`Admin`])
//! - **[`graph`]**: a `petgraph` view over cached relationships
//!
//! ## Quick Start
//!
//! ```rust
//! use typelens::{
//!     descriptor::{FieldDescriptor, Reflect, TypeDescriptor},
//!     policy::{FieldPolicy, Policy, TypePolicy},
//!     Lens, LensConfig,
//! };
//!
//! pub struct Order {
//!     pub id: String,
//! }
//!
//! impl Reflect for Order {
//!     fn descriptor() -> TypeDescriptor {
//!         TypeDescriptor::record("Order", "github.com/acme/shop/models")
//!             .field(FieldDescriptor::of::<String>("OrderID"))
//!     }
//! }
//!
//! pub struct User {
//!     pub id: String,
//!     pub orders: Vec<Order>,
//!     pub tags: Vec<String>,
//! }
//!
//! impl Reflect for User {
//!     fn descriptor() -> TypeDescriptor {
//!         TypeDescriptor::record("User", "github.com/acme/shop/models")
//!             .field(FieldDescriptor::of::<String>("ID").tags(r#"json:"id""#))
//!             .field(FieldDescriptor::of::<Vec<Order>>("Orders"))
//!             .field(FieldDescriptor::of::<Vec<String>>("Tags"))
//!     }
//! }
//!
//! # fn main() -> Result<(), typelens::LensError> {
//! let lens = Lens::new(LensConfig::default());
//! let admin = lens.create_admin()?;
//! admin.add_policy(Policy::new("json").with_type(
//!     TypePolicy::new("*")
//!         .classify("model")
//!         .field(FieldPolicy::new("*")?.apply("json", "{snake}")),
//! ))?;
//! admin.seal()?;
//!
//! let user = lens.scan::<User>()?;
//! assert_eq!(user.classification.as_deref(), Some("model"));
//! assert_eq!(user.field("Orders").unwrap().annotation("json"), "orders");
//! assert_eq!(user.relationships.len(), 1);
//! assert_eq!(lens.browse().len(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! ## Strict and non-strict extraction
//!
//! Policy violations (missing required fields, missing or forbidden tags) abort extraction when
//! the lens is strict. Otherwise they are logged, recorded in [`Metadata::warnings`], and the
//! best-effort metadata is returned. Type-shape errors and lifecycle errors are always returned.

pub mod cache;
pub mod config;
pub mod convention;
pub mod descriptor;
pub mod error;
pub mod graph;
pub mod lens;
pub mod metadata;
pub mod pipeline;
pub mod policy;
pub mod relationship;
#[cfg(test)]
mod tests;

pub use config::LensConfig;
pub use descriptor::{Reflect, TypeDescriptor};
pub use error::*;
pub use lens::{Admin, Lens};
pub use metadata::{FieldMetadata, Metadata, TypeRelationship};
