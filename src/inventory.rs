//! Inventory valuation and stock alerts

use crate::error::CostError;
use crate::models::Ingredient;

/// Apply a purchase to an ingredient, returning the updated record.
///
/// `quantity` is in purchase units. The new weighted average cost blends the
/// value of stock on hand with the purchase; `last_cost` receives the WAC as
/// it was before this purchase.
pub fn record_purchase(
    ingredient: &Ingredient,
    quantity: f64,
    total_cost: f64,
) -> Result<Ingredient, CostError> {
    if !quantity.is_finite() || quantity <= 0.0 {
        return Err(CostError::InvalidPurchase {
            reason: format!("quantity must be positive, got {}", quantity),
        });
    }
    if !total_cost.is_finite() || total_cost < 0.0 {
        return Err(CostError::InvalidPurchase {
            reason: format!("total cost must not be negative, got {}", total_cost),
        });
    }
    if ingredient.conversion_factor.is_nan() || ingredient.conversion_factor <= 0.0 {
        return Err(CostError::InvalidPurchase {
            reason: format!(
                "ingredient '{}' has conversion factor {}; stock cannot be valued",
                ingredient.id, ingredient.conversion_factor
            ),
        });
    }

    let on_hand = ingredient.current_stock / ingredient.conversion_factor;
    let current_value = on_hand * ingredient.weighted_average_cost;
    let new_total_value = current_value + total_cost;
    let new_total_qty = on_hand + quantity;

    let new_wac = if new_total_qty == 0.0 {
        ingredient.weighted_average_cost
    } else {
        new_total_value / new_total_qty
    };

    Ok(Ingredient {
        current_stock: ingredient.current_stock + quantity * ingredient.conversion_factor,
        last_cost: ingredient.weighted_average_cost,
        weighted_average_cost: new_wac,
        ..ingredient.clone()
    })
}

/// Ingredient whose cost rose past the alert threshold since the last purchase
#[derive(Debug, Clone, PartialEq)]
pub struct CostAlert {
    pub ingredient_id: String,
    pub name: String,
    pub previous: f64,
    pub current: f64,
    pub increase_pct: f64,
}

/// Percentage change from `last_cost` to the current WAC, if there is a prior cost
pub fn cost_increase_pct(ingredient: &Ingredient) -> Option<f64> {
    if ingredient.last_cost == 0.0 {
        return None;
    }
    Some((ingredient.weighted_average_cost - ingredient.last_cost) / ingredient.last_cost * 100.0)
}

pub fn cost_alerts<'a>(
    ingredients: impl IntoIterator<Item = &'a Ingredient>,
    threshold_pct: f64,
) -> Vec<CostAlert> {
    ingredients
        .into_iter()
        .filter_map(|ingredient| {
            let increase = cost_increase_pct(ingredient)?;
            (increase >= threshold_pct).then(|| CostAlert {
                ingredient_id: ingredient.id.clone(),
                name: ingredient.name.clone(),
                previous: ingredient.last_cost,
                current: ingredient.weighted_average_cost,
                increase_pct: increase,
            })
        })
        .collect()
}

/// Ingredients at or below their minimum stock
pub fn low_stock<'a>(ingredients: impl IntoIterator<Item = &'a Ingredient>) -> Vec<&'a Ingredient> {
    ingredients
        .into_iter()
        .filter(|i| i.current_stock <= i.min_stock)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UnitType;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn sack(stock: f64, wac: f64) -> Ingredient {
        Ingredient {
            id: "1".to_string(),
            name: "Flour".to_string(),
            category: "Dry".to_string(),
            purchase_unit: "Sack 25kg".to_string(),
            standard_unit: UnitType::Kg,
            conversion_factor: 25.0,
            waste_factor: 0.02,
            current_stock: stock,
            min_stock: 10.0,
            weighted_average_cost: wac,
            last_cost: wac,
        }
    }

    #[test]
    fn first_purchase_sets_wac() {
        let updated = record_purchase(&sack(0.0, 0.0), 25.0, 25.0).unwrap();
        assert_relative_eq!(updated.weighted_average_cost, 1.0);
        assert_relative_eq!(updated.current_stock, 25.0 * 25.0);
        assert_eq!(updated.last_cost, 0.0);
    }

    #[test]
    fn purchase_blends_with_stock_on_hand() {
        // 50 kg on hand = 2 sacks at 25.00; buy 2 sacks for 60.00
        let updated = record_purchase(&sack(50.0, 25.0), 2.0, 60.0).unwrap();
        assert_relative_eq!(updated.weighted_average_cost, 27.5);
        assert_relative_eq!(updated.current_stock, 100.0);
        assert_relative_eq!(updated.last_cost, 25.0);
    }

    #[test]
    fn last_cost_lags_one_purchase() {
        let first = record_purchase(&sack(0.0, 0.0), 1.0, 20.0).unwrap();
        let second = record_purchase(&first, 1.0, 30.0).unwrap();
        assert_relative_eq!(second.last_cost, 20.0);
        assert_relative_eq!(second.weighted_average_cost, 25.0);
    }

    #[test]
    fn purchase_cancelling_negative_stock_keeps_wac() {
        let mut crate_of_tomatoes = sack(-20.0, 7.0);
        crate_of_tomatoes.conversion_factor = 10.0;

        let updated = record_purchase(&crate_of_tomatoes, 2.0, 5.0).unwrap();
        assert_eq!(updated.weighted_average_cost, 7.0);
        assert_eq!(updated.last_cost, 7.0);
        assert_relative_eq!(updated.current_stock, 0.0);
    }

    #[test]
    fn invalid_purchases_rejected() {
        let flour = sack(0.0, 0.0);
        assert!(record_purchase(&flour, 0.0, 10.0).is_err());
        assert!(record_purchase(&flour, -1.0, 10.0).is_err());
        assert!(record_purchase(&flour, 1.0, -5.0).is_err());
        assert!(record_purchase(&flour, f64::NAN, 5.0).is_err());

        let mut broken = flour.clone();
        broken.conversion_factor = 0.0;
        assert!(matches!(
            record_purchase(&broken, 1.0, 5.0),
            Err(CostError::InvalidPurchase { .. })
        ));
    }

    #[test]
    fn alerts_on_cost_increase() {
        let mut flour = sack(50.0, 25.0);
        flour.last_cost = 22.0;
        let mut cheap = sack(50.0, 10.0);
        cheap.id = "2".to_string();
        cheap.last_cost = 0.0;

        let alerts = cost_alerts([&flour, &cheap], 10.0);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].ingredient_id, "1");
        assert_relative_eq!(alerts[0].increase_pct, 13.6364, epsilon = 1e-4);

        assert!(cost_alerts([&flour], 15.0).is_empty());
    }

    #[test]
    fn low_stock_includes_equal() {
        let at_min = sack(10.0, 1.0);
        let above = sack(10.5, 1.0);
        assert_eq!(low_stock([&at_min, &above]).len(), 1);
    }

    proptest! {
        #[test]
        fn purchase_conserves_value(
            stock in 0.0f64..1000.0,
            wac in 0.0f64..100.0,
            qty in 0.01f64..500.0,
            cost in 0.0f64..10_000.0,
        ) {
            let before = sack(stock, wac);
            let old_value = stock / 25.0 * wac;
            let after = record_purchase(&before, qty, cost).unwrap();
            let new_qty = after.current_stock / 25.0;
            let new_value = after.weighted_average_cost * new_qty;
            prop_assert!((new_value - (old_value + cost)).abs() <= 1e-6 * (1.0 + old_value + cost));
        }
    }
}
