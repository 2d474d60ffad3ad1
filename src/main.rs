//! Recipe Cost Calculator
//!
//! Costs and prices a food-service menu from its bill of materials.

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use rusqlite::Connection;
use tracing::{info, warn};

use recipe_costing::calculator::{self, Resolver, UsedBy};
use recipe_costing::error::CostWarning;
use recipe_costing::models::{
    ComponentKind, Dish, GlobalSettings, Ingredient, PreRecipe, RecipeComponent, UnitType,
};
use recipe_costing::{db, import, inventory, pricing};

#[derive(Parser)]
#[command(name = "recipe-cost")]
#[command(about = "Recipe costing and menu pricing")]
struct Cli {
    /// Path to the SQLite database
    #[arg(short, long, default_value = "recipe_costs.db")]
    database: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize empty database with schema
    Init,

    /// Load sample data for testing
    LoadSample,

    /// Import a JSON catalog file, or every *.json under a directory
    Import {
        path: PathBuf,

        /// Clear existing catalog before import
        #[arg(long)]
        clear: bool,
    },

    /// Write the whole catalog as JSON
    Export {
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List ingredients with their unit cost and stock
    Ingredients,

    /// Add or replace an ingredient
    AddIngredient {
        id: String,
        name: String,
        #[arg(long, default_value = "")]
        category: String,
        /// Purchase unit label (e.g. "Sack 25kg")
        #[arg(long)]
        purchase_unit: String,
        /// Standard unit (kg, gr, L, ml, un, lb, oz)
        #[arg(long)]
        unit: UnitType,
        /// Standard units per purchase unit
        #[arg(long)]
        conversion: f64,
        /// Waste fraction, 0 to <1
        #[arg(long, default_value = "0")]
        waste: f64,
        /// Cost per purchase unit
        #[arg(long, default_value = "0")]
        cost: f64,
        #[arg(long, default_value = "0")]
        stock: f64,
        #[arg(long, default_value = "0")]
        min_stock: f64,
    },

    /// List pre-recipes with their cost per output unit
    PreRecipes,

    /// Add or replace a pre-recipe
    AddPreRecipe {
        id: String,
        name: String,
        #[arg(long)]
        unit: UnitType,
        /// Batch output quantity
        #[arg(long = "yield")]
        yield_quantity: f64,
        /// Component as <type>:<id>=<quantity>, repeatable
        #[arg(short, long = "component")]
        components: Vec<String>,
    },

    /// Price every dish on the menu
    Menu {
        /// Print the breakdowns as JSON
        #[arg(long)]
        json: bool,
    },

    /// Add or replace a dish
    AddDish {
        id: String,
        name: String,
        #[arg(long, default_value = "")]
        category: String,
        /// Preparation time in minutes
        #[arg(long, default_value = "0")]
        prep_minutes: f64,
        /// Component as <type>:<id>=<quantity>, repeatable
        #[arg(short, long = "component")]
        components: Vec<String>,
        /// Margin override, percent
        #[arg(long)]
        margin: Option<f64>,
        /// Tax rate override, percent
        #[arg(long)]
        tax: Option<f64>,
    },

    /// Show the price breakdown of a dish
    Cost {
        dish: String,

        /// Show detailed component tree
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show the cost tree of one pre-recipe batch
    Explain { pre_recipe: String },

    /// Record a purchase and revalue the ingredient
    Purchase {
        ingredient: String,
        /// Quantity in purchase units
        quantity: f64,
        /// Total paid
        cost: f64,
        #[arg(long)]
        supplier: Option<String>,
    },

    /// Show purchase history
    Purchases {
        ingredient: Option<String>,

        /// Print the log as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show low-stock and cost-increase alerts
    Alerts,

    /// List pre-recipes and dishes that use an ingredient or pre-recipe
    WhereUsed { id: String },

    /// Delete an item
    Delete {
        kind: ItemKind,
        id: String,

        /// Delete even if still referenced
        #[arg(long)]
        force: bool,
    },

    /// Show or change global settings
    Settings {
        #[command(subcommand)]
        action: Option<SettingsAction>,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    Show,
    Set {
        #[arg(long)]
        labor_rate: Option<f64>,
        /// Overhead as percent of ingredient cost
        #[arg(long)]
        overhead: Option<f64>,
        #[arg(long)]
        margin: Option<f64>,
        #[arg(long)]
        tax: Option<f64>,
        #[arg(long)]
        currency: Option<String>,
        #[arg(long)]
        alert_threshold: Option<f64>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ItemKind {
    Ingredient,
    PreRecipe,
    Dish,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut conn = Connection::open(&cli.database)
        .with_context(|| format!("Failed to open {}", cli.database.display()))?;
    db::init_schema(&conn)?;

    match cli.command {
        Commands::Init => {
            println!("Database initialized at: {}", cli.database.display());
        }

        Commands::LoadSample => {
            load_sample_data(&mut conn)?;
            println!("Sample data loaded successfully!");
        }

        Commands::Import { path, clear } => {
            if clear {
                println!("Clearing existing catalog...");
                db::clear_catalog(&conn)?;
            }

            let stats = import::import_to_database(&mut conn, &path)?;
            println!("{}", stats);
        }

        Commands::Export { output } => {
            let catalog = import::export_catalog(&conn)?;
            let json = serde_json::to_string_pretty(&catalog)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    info!(path = %path.display(), "exported catalog");
                }
                None => println!("{}", json),
            }
        }

        Commands::Ingredients => {
            let ingredients = db::load_ingredients(&conn)?;
            let settings = db::load_settings(&conn)?;
            if ingredients.is_empty() {
                println!("No ingredients in database. Run 'import' or 'load-sample' first.");
            } else {
                println!(
                    "{:<6} {:<24} {:>12} {:>12} {:>10} {:>8}",
                    "ID", "Ingredient", "WAC", "Cost/unit", "Stock", "Min"
                );
                println!("{}", "-".repeat(77));
                for i in ingredients.values() {
                    println!(
                        "{:<6} {:<24} {:>12.2} {:>9.4}/{:<2} {:>10.2} {:>8.2}",
                        i.id,
                        i.name,
                        i.weighted_average_cost,
                        calculator::cue(i),
                        i.standard_unit,
                        i.current_stock,
                        i.min_stock
                    );
                }
                println!("\nCurrency: {}", settings.currency);
            }
        }

        Commands::AddIngredient {
            id,
            name,
            category,
            purchase_unit,
            unit,
            conversion,
            waste,
            cost,
            stock,
            min_stock,
        } => {
            if !(0.0..1.0).contains(&waste) || conversion <= 0.0 {
                warn!(%id, conversion, waste, "ingredient cannot be costed normally");
            }
            let ingredient = Ingredient {
                id,
                name,
                category,
                purchase_unit,
                standard_unit: unit,
                conversion_factor: conversion,
                waste_factor: waste,
                current_stock: stock,
                min_stock,
                weighted_average_cost: cost,
                last_cost: cost,
            };
            db::upsert_ingredient(&conn, &ingredient)?;
            println!("Saved ingredient {} ({:.4}/{})", ingredient.id, calculator::cue(&ingredient), unit);
        }

        Commands::PreRecipes => {
            let ingredients = db::load_ingredients(&conn)?;
            let pre_recipes = db::load_pre_recipes(&conn)?;
            if pre_recipes.is_empty() {
                println!("No pre-recipes in database.");
            } else {
                println!("{:<6} {:<28} {:>8} {:>14}", "ID", "Pre-recipe", "Yield", "Cost/unit");
                println!("{}", "-".repeat(59));
                for p in pre_recipes.values() {
                    let cost = match calculator::cupr_with_warnings(p, &ingredients, &pre_recipes) {
                        Ok(costed) if costed.is_clean() => format!("{:.4}", costed.value),
                        Ok(costed) => format!("{:.4} (!)", costed.value),
                        Err(e) => format!("error: {}", e),
                    };
                    println!(
                        "{:<6} {:<28} {:>6.2}{:<2} {:>14}",
                        p.id, p.name, p.yield_quantity, p.unit, cost
                    );
                }
            }
        }

        Commands::AddPreRecipe {
            id,
            name,
            unit,
            yield_quantity,
            components,
        } => {
            let pre_recipe = PreRecipe {
                id,
                name,
                unit,
                yield_quantity,
                components: parse_components(&components)?,
            };
            db::upsert_pre_recipe(&mut conn, &pre_recipe)?;
            println!("Saved pre-recipe {} ({} components)", pre_recipe.id, pre_recipe.components.len());
        }

        Commands::Menu { json } => {
            let ingredients = db::load_ingredients(&conn)?;
            let pre_recipes = db::load_pre_recipes(&conn)?;
            let dishes = db::load_dishes(&conn)?;
            let settings = db::load_settings(&conn)?;

            if json {
                let lines: Vec<serde_json::Value> = pricing::price_menu(&dishes, &ingredients, &pre_recipes, &settings)
                    .into_iter()
                    .map(|(id, result)| match result {
                        Ok(costed) => serde_json::json!({
                            "id": id,
                            "name": dishes[&id].name,
                            "cost": costed.value,
                            "warnings": costed.warnings.iter().map(|w| w.to_string()).collect::<Vec<_>>(),
                        }),
                        Err(e) => serde_json::json!({
                            "id": id,
                            "name": dishes[&id].name,
                            "error": e.to_string(),
                        }),
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&lines)?);
            } else if dishes.is_empty() {
                println!("No dishes in database.");
            } else {
                println!(
                    "{:<6} {:<26} {:>10} {:>10} {:>10} {:>12}",
                    "ID", "Dish", "CNI", "CMO", "COI", "Price"
                );
                println!("{}", "-".repeat(79));
                for (id, result) in pricing::price_menu(&dishes, &ingredients, &pre_recipes, &settings) {
                    let name = &dishes[&id].name;
                    match result {
                        Ok(costed) => {
                            let c = costed.value;
                            let flag = if costed.is_clean() { "" } else { " (!)" };
                            println!(
                                "{:<6} {:<26} {:>10.2} {:>10.2} {:>10.2} {:>12.2}{}",
                                id, name, c.cni, c.cmo, c.coi, c.final_price, flag
                            );
                        }
                        Err(e) => println!("{:<6} {:<26} error: {}", id, name, e),
                    }
                }
                println!("\nPrices in {} including tax. (!) = needs attention, see 'cost <dish>'", settings.currency);
            }
        }

        Commands::AddDish {
            id,
            name,
            category,
            prep_minutes,
            components,
            margin,
            tax,
        } => {
            let dish = Dish {
                id,
                name,
                category,
                preparation_time_minutes: prep_minutes,
                components: parse_components(&components)?,
                target_margin: margin,
                tax_rate: tax,
            };
            db::upsert_dish(&mut conn, &dish)?;
            println!("Saved dish {} ({} components)", dish.id, dish.components.len());
        }

        Commands::Cost { dish, verbose } => {
            let ingredients = db::load_ingredients(&conn)?;
            let pre_recipes = db::load_pre_recipes(&conn)?;
            let settings = db::load_settings(&conn)?;
            let dishes = db::load_dishes(&conn)?;
            let dish = dishes
                .get(&dish)
                .ok_or_else(|| anyhow!("Dish '{}' not found", dish))?;

            let costed = pricing::price_with_warnings(dish, &ingredients, &pre_recipes, &settings)?;
            let policy = pricing::PricingPolicy::resolve(dish, &settings);
            let cur = &settings.currency;
            let c = costed.value;

            if verbose {
                let mut resolver = Resolver::new(&ingredients, &pre_recipes);
                let nodes = resolver.explain(&dish.components, 1.0);
                println!("Components:\n");
                println!("{}", calculator::format_cost_tree(&nodes, 1, cur));
                println!("{}", calculator::summarize_breakdown(&nodes, cur));
            }

            println!("=== {} ===", dish.name);
            println!("  Ingredients (CNI): {:>10.2} {}", c.cni, cur);
            println!("  Labor (CMO):       {:>10.2} {}  ({} min)", c.cmo, cur, dish.preparation_time_minutes);
            println!("  Overhead (COI):    {:>10.2} {}", c.coi, cur);
            println!("  Base cost:         {:>10.2} {}", c.base_cost, cur);
            println!("  Margin:            {:>10.2} {}  ({}%)", c.margin_amount(policy.tax_rate), cur, policy.margin);
            println!("  Before tax (approx){:>10.2} {}", c.suggested_price, cur);
            println!("  Final price (PFC): {:>10.2} {}  (incl. {}% tax)", c.final_price, cur, policy.tax_rate);
            print_warnings(&costed.warnings);
        }

        Commands::Explain { pre_recipe } => {
            let ingredients = db::load_ingredients(&conn)?;
            let pre_recipes = db::load_pre_recipes(&conn)?;
            let settings = db::load_settings(&conn)?;
            let p = pre_recipes
                .get(&pre_recipe)
                .ok_or_else(|| anyhow!("Pre-recipe '{}' not found", pre_recipe))?;

            let mut resolver = Resolver::new(&ingredients, &pre_recipes);
            let nodes = resolver.explain(&p.components, 1.0);
            let unit_cost = resolver.pre_recipe_unit_cost(p);

            println!("{} (batch of {} {}):\n", p.name, p.yield_quantity, p.unit);
            println!("{}", calculator::format_cost_tree(&nodes, 1, &settings.currency));
            println!("{}", calculator::summarize_breakdown(&nodes, &settings.currency));
            match unit_cost {
                Ok(cost) => println!("Cost per {}: {:.4} {}", p.unit, cost, settings.currency),
                Err(e) => println!("Cost per {}: error: {}", p.unit, e),
            }
            print_warnings(resolver.warnings());
        }

        Commands::Purchase {
            ingredient,
            quantity,
            cost,
            supplier,
        } => {
            let settings = db::load_settings(&conn)?;
            let updated = db::record_purchase(&mut conn, &ingredient, quantity, cost, supplier.as_deref())?;
            println!("Purchase recorded for {}", updated.name);
            println!("  Stock: {:.2} {}", updated.current_stock, updated.standard_unit);
            println!(
                "  WAC:   {:.2} -> {:.2} {} per {}",
                updated.last_cost, updated.weighted_average_cost, settings.currency, updated.purchase_unit
            );
            if let Some(alert) = inventory::cost_alerts([&updated], settings.cost_alert_threshold).first() {
                println!("  Cost alert: +{:.1}%", alert.increase_pct);
            }
        }

        Commands::Purchases { ingredient, json } => {
            let purchases = db::list_purchases(&conn, ingredient.as_deref())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&purchases)?);
            } else if purchases.is_empty() {
                println!("No purchases recorded.");
            } else {
                println!("{:<20} {:<8} {:>10} {:>12}  Supplier", "Date", "Item", "Qty", "Total");
                for p in purchases {
                    println!(
                        "{:<20} {:<8} {:>10.2} {:>12.2}  {}",
                        p.date.format("%Y-%m-%d %H:%M"),
                        p.ingredient_id,
                        p.quantity,
                        p.total_cost,
                        p.supplier.unwrap_or_default()
                    );
                }
            }
        }

        Commands::Alerts => {
            let ingredients = db::load_ingredients(&conn)?;
            let settings = db::load_settings(&conn)?;

            let low = inventory::low_stock(ingredients.values());
            println!("Low stock ({}):", low.len());
            for i in low {
                println!("  {:<24} {:.2} / min {:.2} {}", i.name, i.current_stock, i.min_stock, i.standard_unit);
            }

            let alerts = inventory::cost_alerts(ingredients.values(), settings.cost_alert_threshold);
            println!("\nCost increases (+{}% or more) ({}):", settings.cost_alert_threshold, alerts.len());
            for a in alerts {
                println!(
                    "  {:<24} {:.2} -> {:.2} {} (+{:.1}%)",
                    a.name, a.previous, a.current, settings.currency, a.increase_pct
                );
            }
        }

        Commands::WhereUsed { id } => {
            let pre_recipes = db::load_pre_recipes(&conn)?;
            let dishes = db::load_dishes(&conn)?;
            for kind in [ComponentKind::Ingredient, ComponentKind::PreRecipe] {
                let used = calculator::where_used(kind, &id, &pre_recipes, &dishes);
                if !used.is_empty() {
                    println!("As {}:", kind);
                    print_used_by(&used);
                }
            }
        }

        Commands::Delete { kind, id, force } => {
            let kind = match kind {
                ItemKind::Dish => {
                    db::delete_dish(&mut conn, &id)?;
                    println!("Deleted dish {}", id);
                    return Ok(());
                }
                ItemKind::Ingredient => ComponentKind::Ingredient,
                ItemKind::PreRecipe => ComponentKind::PreRecipe,
            };
            let orphaned = db::delete_component_item(&mut conn, kind, &id, force)?;
            println!("Deleted {} {}", kind, id);
            if !orphaned.is_empty() {
                println!("Now costed as 0 in:");
                print_used_by(&orphaned);
            }
        }

        Commands::Settings { action } => {
            let mut settings = db::load_settings(&conn)?;
            if let Some(SettingsAction::Set {
                labor_rate,
                overhead,
                margin,
                tax,
                currency,
                alert_threshold,
            }) = action
            {
                apply(&mut settings.hourly_labor_rate, labor_rate);
                apply(&mut settings.indirect_cost_percentage, overhead);
                apply(&mut settings.default_margin, margin);
                apply(&mut settings.default_tax_rate, tax);
                apply(&mut settings.currency, currency);
                apply(&mut settings.cost_alert_threshold, alert_threshold);
                db::save_settings(&conn, &settings)?;
                info!("settings updated");
            }
            print_settings(&settings);
        }
    }

    Ok(())
}

fn apply<T>(field: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *field = value;
    }
}

fn parse_components(specs: &[String]) -> Result<Vec<RecipeComponent>> {
    specs.iter().map(|s| import::parse_component_spec(s)).collect()
}

fn print_warnings(warnings: &[CostWarning]) {
    if warnings.is_empty() {
        return;
    }
    println!("\nNeeds attention:");
    for w in warnings {
        println!("  ! {}", w);
    }
}

fn print_used_by(used: &[UsedBy]) {
    for u in used {
        match u {
            UsedBy::PreRecipe(id) => println!("  pre-recipe {}", id),
            UsedBy::Dish(id) => println!("  dish {}", id),
        }
    }
}

fn print_settings(settings: &GlobalSettings) {
    println!("Labor rate:       {:.2} {}/h", settings.hourly_labor_rate, settings.currency);
    println!("Overhead:         {}% of ingredient cost", settings.indirect_cost_percentage);
    println!("Default margin:   {}%", settings.default_margin);
    println!("Default tax:      {}%", settings.default_tax_rate);
    println!("Currency:         {}", settings.currency);
    println!("Alert threshold:  {}%", settings.cost_alert_threshold);
}

/// Load a small sample menu for testing
fn load_sample_data(conn: &mut Connection) -> Result<()> {
    db::clear_catalog(conn)?;
    db::save_settings(conn, &GlobalSettings::default())?;

    let flour = Ingredient {
        id: "1".to_string(),
        name: "Wheat Flour".to_string(),
        category: "Dry".to_string(),
        purchase_unit: "Sack 25kg".to_string(),
        standard_unit: UnitType::Kg,
        conversion_factor: 25.0,
        waste_factor: 0.02,
        current_stock: 50.0,
        min_stock: 10.0,
        weighted_average_cost: 25.0,
        last_cost: 22.0, // was cheaper before
    };
    db::upsert_ingredient(conn, &flour)?;

    let tomato = Ingredient {
        id: "2".to_string(),
        name: "Saladette Tomato".to_string(),
        category: "Fresh".to_string(),
        purchase_unit: "Box 10kg".to_string(),
        standard_unit: UnitType::Kg,
        conversion_factor: 10.0,
        waste_factor: 0.15,
        current_stock: 5.0,
        min_stock: 8.0, // low stock
        weighted_average_cost: 18.0,
        last_cost: 18.0,
    };
    db::upsert_ingredient(conn, &tomato)?;

    let beef = Ingredient {
        id: "3".to_string(),
        name: "Ground Beef".to_string(),
        category: "Protein".to_string(),
        purchase_unit: "kg".to_string(),
        standard_unit: UnitType::Kg,
        conversion_factor: 1.0,
        waste_factor: 0.05,
        current_stock: 12.0,
        min_stock: 5.0,
        weighted_average_cost: 8.5,
        last_cost: 8.5,
    };
    db::upsert_ingredient(conn, &beef)?;

    // 6 kg of tomatoes reduce to 5 L of sauce
    let sauce = PreRecipe {
        id: "p1".to_string(),
        name: "Pomodoro Sauce Base".to_string(),
        unit: UnitType::L,
        yield_quantity: 5.0,
        components: vec![RecipeComponent::ingredient("2", 6.0)],
    };
    db::upsert_pre_recipe(conn, &sauce)?;

    let bolognese = Dish {
        id: "d1".to_string(),
        name: "Pasta Bolognese".to_string(),
        category: "Main".to_string(),
        preparation_time_minutes: 15.0,
        components: vec![
            RecipeComponent::ingredient("1", 0.15),
            RecipeComponent::ingredient("3", 0.20),
            RecipeComponent::pre_recipe("p1", 0.25),
        ],
        target_margin: None,
        tax_rate: None,
    };
    db::upsert_dish(conn, &bolognese)?;

    println!("Loaded 3 ingredients, 1 pre-recipe and 1 dish");
    Ok(())
}
