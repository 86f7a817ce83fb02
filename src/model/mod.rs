//! Core data types for inventory, findings and scan results.
//!
//! - [`Package`] - A discovered software package
//! - [`PackageVuln`] - A vulnerability tied to a package
//! - [`GenericFinding`] - A finding not tied to any package
//! - [`Inventory`] - Everything a scan has collected
//! - [`ScanResult`] - The terminal, sorted artifact of a scan
//!
//! # Example
//!
//! ```
//! use invscan::model::{Inventory, Package};
//!
//! let mut inventory = Inventory::default();
//! inventory.packages.push(Package::new("lodash", "4.17.21", "npm").with_location("package-lock.json"));
//!
//! println!("Collected {} packages", inventory.packages.len());
//! ```

mod finding;
mod inventory;
mod package;
mod result;

pub use finding::*;
pub use inventory::*;
pub use package::*;
pub use result::*;
