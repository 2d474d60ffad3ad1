//! Database schema and operations

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use tracing::info;

use crate::calculator::{UsedBy, find_cycle, where_used};
use crate::error::CostError;
use crate::inventory;
use crate::models::{
    ComponentKind, Dish, DishTable, GlobalSettings, Ingredient, IngredientTable, PreRecipe,
    PreRecipeTable, PurchaseLog, RecipeComponent,
};

const OWNER_PRE_RECIPE: &str = "pre-recipe";
const OWNER_DISH: &str = "dish";

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Raw ingredients; cost is per purchase unit, stock in standard units
        CREATE TABLE IF NOT EXISTS ingredients (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            category TEXT NOT NULL DEFAULT '',
            purchase_unit TEXT NOT NULL,
            standard_unit TEXT NOT NULL,
            conversion_factor REAL NOT NULL,
            waste_factor REAL NOT NULL DEFAULT 0,
            current_stock REAL NOT NULL DEFAULT 0,
            min_stock REAL NOT NULL DEFAULT 0,
            weighted_average_cost REAL NOT NULL DEFAULT 0,
            last_cost REAL NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS pre_recipes (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            unit TEXT NOT NULL,
            yield_quantity REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS dishes (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            category TEXT NOT NULL DEFAULT '',
            preparation_time_minutes REAL NOT NULL DEFAULT 0,
            target_margin REAL,
            tax_rate REAL
        );

        -- Bill-of-materials lines for pre-recipes and dishes, in order
        CREATE TABLE IF NOT EXISTS components (
            owner_kind TEXT NOT NULL,
            owner_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            component_type TEXT NOT NULL,
            component_id TEXT NOT NULL,
            quantity REAL NOT NULL,
            PRIMARY KEY (owner_kind, owner_id, position)
        );

        -- Single row of global settings
        CREATE TABLE IF NOT EXISTS settings (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            hourly_labor_rate REAL NOT NULL,
            indirect_cost_percentage REAL NOT NULL,
            default_margin REAL NOT NULL,
            default_tax_rate REAL NOT NULL,
            currency TEXT NOT NULL,
            cost_alert_threshold REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS purchases (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ingredient_id TEXT NOT NULL,
            date TEXT NOT NULL,
            quantity REAL NOT NULL,
            total_cost REAL NOT NULL,
            supplier TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_components_ref ON components(component_type, component_id);
        CREATE INDEX IF NOT EXISTS idx_purchases_ingredient ON purchases(ingredient_id);
        "#,
    )?;
    Ok(())
}

fn parse_column<T: std::str::FromStr<Err = String>>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::<dyn std::error::Error + Send + Sync>::from(e))
    })
}

fn ingredient_from_row(row: &Row) -> rusqlite::Result<Ingredient> {
    Ok(Ingredient {
        id: row.get(0)?,
        name: row.get(1)?,
        category: row.get(2)?,
        purchase_unit: row.get(3)?,
        standard_unit: parse_column(row, 4)?,
        conversion_factor: row.get(5)?,
        waste_factor: row.get(6)?,
        current_stock: row.get(7)?,
        min_stock: row.get(8)?,
        weighted_average_cost: row.get(9)?,
        last_cost: row.get(10)?,
    })
}

const INGREDIENT_COLUMNS: &str = "id, name, category, purchase_unit, standard_unit, conversion_factor,
     waste_factor, current_stock, min_stock, weighted_average_cost, last_cost";

/// Insert or replace an ingredient
pub fn upsert_ingredient(conn: &Connection, ingredient: &Ingredient) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT OR REPLACE INTO ingredients ({INGREDIENT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
        ),
        params![
            ingredient.id,
            ingredient.name,
            ingredient.category,
            ingredient.purchase_unit,
            ingredient.standard_unit.as_str(),
            ingredient.conversion_factor,
            ingredient.waste_factor,
            ingredient.current_stock,
            ingredient.min_stock,
            ingredient.weighted_average_cost,
            ingredient.last_cost,
        ],
    )?;
    Ok(())
}

pub fn get_ingredient(conn: &Connection, id: &str) -> Result<Option<Ingredient>> {
    let ingredient = conn
        .query_row(
            &format!("SELECT {INGREDIENT_COLUMNS} FROM ingredients WHERE id = ?1"),
            [id],
            ingredient_from_row,
        )
        .optional()?;
    Ok(ingredient)
}

/// All ingredients keyed by id
pub fn load_ingredients(conn: &Connection) -> Result<IngredientTable> {
    let mut stmt = conn.prepare(&format!("SELECT {INGREDIENT_COLUMNS} FROM ingredients"))?;
    let rows = stmt.query_map([], ingredient_from_row)?;

    let mut table = IngredientTable::new();
    for row in rows {
        let ingredient = row?;
        table.insert(ingredient.id.clone(), ingredient);
    }
    Ok(table)
}

fn write_components(
    conn: &Connection,
    owner_kind: &str,
    owner_id: &str,
    components: &[RecipeComponent],
) -> Result<()> {
    conn.execute(
        "DELETE FROM components WHERE owner_kind = ?1 AND owner_id = ?2",
        (owner_kind, owner_id),
    )?;
    for (position, component) in components.iter().enumerate() {
        conn.execute(
            "INSERT INTO components (owner_kind, owner_id, position, component_type, component_id, quantity)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                owner_kind,
                owner_id,
                position as i64,
                component.kind.as_str(),
                component.id,
                component.quantity,
            ],
        )?;
    }
    Ok(())
}

fn read_components(conn: &Connection, owner_kind: &str, owner_id: &str) -> Result<Vec<RecipeComponent>> {
    let mut stmt = conn.prepare(
        "SELECT component_type, component_id, quantity
         FROM components
         WHERE owner_kind = ?1 AND owner_id = ?2
         ORDER BY position",
    )?;

    let rows = stmt.query_map((owner_kind, owner_id), |row| {
        Ok(RecipeComponent {
            kind: parse_column(row, 0)?,
            id: row.get(1)?,
            quantity: row.get(2)?,
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// Insert or replace a pre-recipe and its components.
///
/// Rejected if the new component list would make any pre-recipe reference
/// itself. The cycle check reads the table inside the same IMMEDIATE
/// transaction as the write, so no other writer can close a cycle in between.
pub fn upsert_pre_recipe(conn: &mut Connection, pre_recipe: &PreRecipe) -> Result<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    write_pre_recipe(&tx, pre_recipe)?;
    tx.commit()?;
    Ok(())
}

/// Cycle-check and write a pre-recipe on a connection already inside a
/// transaction
pub(crate) fn write_pre_recipe(conn: &Connection, pre_recipe: &PreRecipe) -> Result<()> {
    let mut table = load_pre_recipes(conn)?;
    table.insert(pre_recipe.id.clone(), pre_recipe.clone());
    if let Some(path) = find_cycle(&table) {
        return Err(CostError::CyclicReference { path }.into());
    }

    conn.execute(
        "INSERT OR REPLACE INTO pre_recipes (id, name, unit, yield_quantity) VALUES (?1, ?2, ?3, ?4)",
        params![
            pre_recipe.id,
            pre_recipe.name,
            pre_recipe.unit.as_str(),
            pre_recipe.yield_quantity
        ],
    )?;
    write_components(conn, OWNER_PRE_RECIPE, &pre_recipe.id, &pre_recipe.components)
}

pub fn load_pre_recipes(conn: &Connection) -> Result<PreRecipeTable> {
    let mut stmt = conn.prepare("SELECT id, name, unit, yield_quantity FROM pre_recipes")?;
    let rows = stmt.query_map([], |row| {
        Ok(PreRecipe {
            id: row.get(0)?,
            name: row.get(1)?,
            unit: parse_column(row, 2)?,
            yield_quantity: row.get(3)?,
            components: Vec::new(),
        })
    })?;

    let mut table = PreRecipeTable::new();
    for row in rows {
        let mut pre_recipe = row?;
        pre_recipe.components = read_components(conn, OWNER_PRE_RECIPE, &pre_recipe.id)?;
        table.insert(pre_recipe.id.clone(), pre_recipe);
    }
    Ok(table)
}

/// Insert or replace a dish and its components
pub fn upsert_dish(conn: &mut Connection, dish: &Dish) -> Result<()> {
    let tx = conn.transaction()?;
    write_dish(&tx, dish)?;
    tx.commit()?;
    Ok(())
}

pub(crate) fn write_dish(conn: &Connection, dish: &Dish) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO dishes (id, name, category, preparation_time_minutes, target_margin, tax_rate)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            dish.id,
            dish.name,
            dish.category,
            dish.preparation_time_minutes,
            dish.target_margin,
            dish.tax_rate,
        ],
    )?;
    write_components(conn, OWNER_DISH, &dish.id, &dish.components)
}

pub fn load_dishes(conn: &Connection) -> Result<DishTable> {
    let mut stmt = conn.prepare(
        "SELECT id, name, category, preparation_time_minutes, target_margin, tax_rate FROM dishes",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(Dish {
            id: row.get(0)?,
            name: row.get(1)?,
            category: row.get(2)?,
            preparation_time_minutes: row.get(3)?,
            components: Vec::new(),
            target_margin: row.get(4)?,
            tax_rate: row.get(5)?,
        })
    })?;

    let mut table = DishTable::new();
    for row in rows {
        let mut dish = row?;
        dish.components = read_components(conn, OWNER_DISH, &dish.id)?;
        table.insert(dish.id.clone(), dish);
    }
    Ok(table)
}

/// Delete an ingredient or pre-recipe.
///
/// Refused while pre-recipes or dishes still reference it, unless `force`
/// is set; forced deletes leave those references dangling.
pub fn delete_component_item(
    conn: &mut Connection,
    kind: ComponentKind,
    id: &str,
    force: bool,
) -> Result<Vec<UsedBy>> {
    let used = where_used(kind, id, &load_pre_recipes(conn)?, &load_dishes(conn)?);
    if !used.is_empty() && !force {
        let names: Vec<String> = used
            .iter()
            .map(|u| match u {
                UsedBy::PreRecipe(id) => format!("pre-recipe {}", id),
                UsedBy::Dish(id) => format!("dish {}", id),
            })
            .collect();
        bail!("{} '{}' is still used by: {}", kind, id, names.join(", "));
    }

    let tx = conn.transaction()?;
    let deleted = match kind {
        ComponentKind::Ingredient => tx.execute("DELETE FROM ingredients WHERE id = ?1", [id])?,
        ComponentKind::PreRecipe => {
            tx.execute(
                "DELETE FROM components WHERE owner_kind = ?1 AND owner_id = ?2",
                (OWNER_PRE_RECIPE, id),
            )?;
            tx.execute("DELETE FROM pre_recipes WHERE id = ?1", [id])?
        }
    };
    if deleted == 0 {
        return Err(anyhow!("{} '{}' not found", kind, id));
    }
    tx.commit()?;

    info!(%kind, id, orphaned = used.len(), "deleted");
    Ok(used)
}

pub fn delete_dish(conn: &mut Connection, id: &str) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute(
        "DELETE FROM components WHERE owner_kind = ?1 AND owner_id = ?2",
        (OWNER_DISH, id),
    )?;
    if tx.execute("DELETE FROM dishes WHERE id = ?1", [id])? == 0 {
        bail!("dish '{}' not found", id);
    }
    tx.commit()?;
    Ok(())
}

/// Current settings, or the defaults if none were saved
pub fn load_settings(conn: &Connection) -> Result<GlobalSettings> {
    let settings = conn
        .query_row(
            "SELECT hourly_labor_rate, indirect_cost_percentage, default_margin, default_tax_rate,
                    currency, cost_alert_threshold
             FROM settings WHERE id = 1",
            [],
            |row| {
                Ok(GlobalSettings {
                    hourly_labor_rate: row.get(0)?,
                    indirect_cost_percentage: row.get(1)?,
                    default_margin: row.get(2)?,
                    default_tax_rate: row.get(3)?,
                    currency: row.get(4)?,
                    cost_alert_threshold: row.get(5)?,
                })
            },
        )
        .optional()?;
    Ok(settings.unwrap_or_default())
}

pub fn save_settings(conn: &Connection, settings: &GlobalSettings) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO settings
            (id, hourly_labor_rate, indirect_cost_percentage, default_margin, default_tax_rate,
             currency, cost_alert_threshold)
         VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            settings.hourly_labor_rate,
            settings.indirect_cost_percentage,
            settings.default_margin,
            settings.default_tax_rate,
            settings.currency,
            settings.cost_alert_threshold,
        ],
    )?;
    Ok(())
}

/// Post a purchase: revalue the ingredient and append to the purchase log.
///
/// The read-modify-write runs in an IMMEDIATE transaction so concurrent
/// postings for the same ingredient are serialized by SQLite's write lock.
pub fn record_purchase(
    conn: &mut Connection,
    ingredient_id: &str,
    quantity: f64,
    total_cost: f64,
    supplier: Option<&str>,
) -> Result<Ingredient> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let current = get_ingredient(&tx, ingredient_id)?.ok_or_else(|| CostError::UnknownIngredient {
        id: ingredient_id.to_string(),
    })?;
    let updated = inventory::record_purchase(&current, quantity, total_cost)?;

    tx.execute(
        "UPDATE ingredients SET current_stock = ?1, weighted_average_cost = ?2, last_cost = ?3 WHERE id = ?4",
        params![
            updated.current_stock,
            updated.weighted_average_cost,
            updated.last_cost,
            updated.id
        ],
    )?;
    tx.execute(
        "INSERT INTO purchases (ingredient_id, date, quantity, total_cost, supplier)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            ingredient_id,
            Utc::now().to_rfc3339(),
            quantity,
            total_cost,
            supplier
        ],
    )?;
    tx.commit()?;

    info!(
        ingredient = ingredient_id,
        quantity,
        total_cost,
        wac = updated.weighted_average_cost,
        "recorded purchase"
    );
    Ok(updated)
}

/// Purchase history, newest first
pub fn list_purchases(conn: &Connection, ingredient_id: Option<&str>) -> Result<Vec<PurchaseLog>> {
    let mut stmt = conn.prepare(
        "SELECT id, ingredient_id, date, quantity, total_cost, supplier
         FROM purchases
         WHERE ?1 IS NULL OR ingredient_id = ?1
         ORDER BY id DESC",
    )?;

    let rows = stmt.query_map([ingredient_id], |row| {
        let date: String = row.get(2)?;
        let date = DateTime::parse_from_rfc3339(&date)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?
            .with_timezone(&Utc);
        Ok(PurchaseLog {
            id: row.get(0)?,
            ingredient_id: row.get(1)?,
            date,
            quantity: row.get(3)?,
            total_cost: row.get(4)?,
            supplier: row.get(5)?,
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// Clear the whole catalog (for re-import). Settings are kept.
pub fn clear_catalog(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DELETE FROM components;
        DELETE FROM dishes;
        DELETE FROM pre_recipes;
        DELETE FROM purchases;
        DELETE FROM ingredients;
        "#,
    )
    .context("Failed to clear catalog")?;
    Ok(())
}
