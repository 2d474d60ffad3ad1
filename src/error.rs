//! Engine errors and non-fatal costing warnings

use std::fmt;

use thiserror::Error;

use crate::models::ComponentKind;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CostError {
    #[error("cyclic pre-recipe reference: {}", .path.join(" -> "))]
    CyclicReference { path: Vec<String> },

    #[error("invalid purchase: {reason}")]
    InvalidPurchase { reason: String },

    #[error("unknown ingredient '{id}'")]
    UnknownIngredient { id: String },
}

/// Something an operator should look at. The accompanying cost is a fallback,
/// not real economics.
#[derive(Debug, Clone, PartialEq)]
pub enum CostWarning {
    DanglingReference { kind: ComponentKind, id: String },
    ZeroConversionFactor { ingredient: String },
    NoUsableYield { ingredient: String, waste_factor: f64 },
    ZeroYield { pre_recipe: String },
    Unpriceable { dish: String, tax_rate: f64 },
}

impl fmt::Display for CostWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CostWarning::DanglingReference { kind, id } => {
                write!(f, "{} '{}' is referenced but does not exist (costed as 0)", kind, id)
            }
            CostWarning::ZeroConversionFactor { ingredient } => {
                write!(f, "ingredient '{}' has a zero conversion factor (costed as 0)", ingredient)
            }
            CostWarning::NoUsableYield {
                ingredient,
                waste_factor,
            } => write!(
                f,
                "ingredient '{}' has waste factor {} leaving nothing usable (sentinel cost)",
                ingredient, waste_factor
            ),
            CostWarning::ZeroYield { pre_recipe } => {
                write!(f, "pre-recipe '{}' has zero yield (costed as 0)", pre_recipe)
            }
            CostWarning::Unpriceable { dish, tax_rate } => {
                write!(f, "dish '{}' has tax rate {}% so no price can be set", dish, tax_rate)
            }
        }
    }
}

/// A computed value together with the warnings raised while computing it
#[derive(Debug, Clone, PartialEq)]
pub struct Costed<T> {
    pub value: T,
    pub warnings: Vec<CostWarning>,
}

impl<T> Costed<T> {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}
