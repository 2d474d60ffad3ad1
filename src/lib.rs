//! Recipe costing engine
//!
//! Computes production cost and selling price for food-service items from a
//! multi-level bill of materials: ingredients, pre-recipes built from
//! ingredients and other pre-recipes, and dishes built from both.

pub mod calculator;
pub mod db;
pub mod error;
pub mod import;
pub mod inventory;
pub mod models;
pub mod pricing;

pub use calculator::{INCOMPUTABLE_COST, component_cost, cue, cupr};
pub use error::{CostError, CostWarning, Costed};
pub use inventory::record_purchase;
pub use pricing::price;
