use crate::infra::{build_api, ServiceApi};
use clap::Args;
use northwind::api::operations::MOST_EXPENSIVE;
use northwind::api::{Order, Product, View};
use northwind::config::AppConfig;
use northwind::error::AppError;
use northwind::model::EdmModel;

#[derive(Args, Debug, Default)]
pub(crate) struct MetadataArgs {
    /// Emit compact JSON instead of pretty-printed output
    #[arg(long)]
    pub(crate) compact: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct ViewsArgs {
    /// Only print the named section (ExpensiveProducts, CurrentOrders or MostExpensive)
    #[arg(long)]
    pub(crate) view: Option<String>,
}

pub(crate) fn run_metadata(args: MetadataArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let api = build_api(&config.api)?;
    println!("{}", render_metadata(&api.metadata(), args.compact)?);
    Ok(())
}

fn render_metadata(metadata: &EdmModel, compact: bool) -> Result<String, AppError> {
    let rendered = if compact {
        serde_json::to_string(metadata)
    } else {
        serde_json::to_string_pretty(metadata)
    };
    Ok(rendered.map_err(std::io::Error::from)?)
}

/// One printable block of the `views` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    View(View),
    MostExpensive,
}

impl Section {
    const ALL: [Section; 3] = [
        Section::View(View::ExpensiveProducts),
        Section::View(View::CurrentOrders),
        Section::MostExpensive,
    ];

    fn name(self) -> &'static str {
        match self {
            Section::View(view) => view.name(),
            Section::MostExpensive => MOST_EXPENSIVE,
        }
    }

    /// Sections to print for `--view`; `None` when the name is unknown.
    fn select(name: Option<&str>) -> Option<Vec<Section>> {
        match name {
            None => Some(Self::ALL.to_vec()),
            Some(name) => Self::ALL
                .into_iter()
                .find(|section| section.name() == name)
                .map(|section| vec![section]),
        }
    }
}

pub(crate) fn run_views(args: ViewsArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let api = build_api(&config.api)?;

    let Some(selected) = Section::select(args.view.as_deref()) else {
        println!(
            "Unknown view '{}'. Available views:",
            args.view.as_deref().unwrap_or_default()
        );
        for section in Section::ALL {
            println!("- {}", section.name());
        }
        return Ok(());
    };

    for section in selected {
        match section {
            Section::View(View::ExpensiveProducts) => render_expensive_products(&api),
            Section::View(View::CurrentOrders) => render_current_orders(&api),
            Section::MostExpensive => render_most_expensive(&api),
        }
    }
    Ok(())
}

fn render_expensive_products(api: &ServiceApi) {
    println!("ExpensiveProducts");
    let products = match api.expensive_products() {
        Ok(query) => query.execute(),
        Err(err) => {
            println!("  unavailable: {err}");
            return;
        }
    };
    for Product {
        product_id,
        product_name,
        unit_price,
        ..
    } in &products
    {
        let price = unit_price.map_or_else(|| "-".to_string(), |price| format!("{price:.2}"));
        println!("  {product_id:>4}  {product_name:<34} {price:>8}");
    }
    println!("  {} product(s)\n", products.len());
}

fn render_current_orders(api: &ServiceApi) {
    println!("CurrentOrders");
    let orders = match api.current_orders() {
        Ok(query) => query.execute(),
        Err(err) => {
            println!("  unavailable: {err}");
            return;
        }
    };
    for Order {
        order_id,
        customer_id,
        order_date,
        ship_country,
        ..
    } in &orders
    {
        let ordered = order_date.map_or_else(|| "-".to_string(), |date| date.to_string());
        println!(
            "  {order_id:>6}  {:<6} {ordered:<10}  {}",
            customer_id.as_deref().unwrap_or("-"),
            ship_country.as_deref().unwrap_or("-"),
        );
    }
    println!("  {} order(s) awaiting shipment\n", orders.len());
}

fn render_most_expensive(api: &ServiceApi) {
    println!("MostExpensive");
    match api.most_expensive() {
        Ok(Some(price)) => println!("  {price:.2}\n"),
        Ok(None) => println!("  no priced products\n"),
        Err(err) => println!("  unavailable: {err}\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prints_every_section_without_a_filter() {
        assert_eq!(
            Section::select(None),
            Some(vec![
                Section::View(View::ExpensiveProducts),
                Section::View(View::CurrentOrders),
                Section::MostExpensive,
            ])
        );
    }

    #[test]
    fn selects_a_single_named_section() {
        assert_eq!(
            Section::select(Some("MostExpensive")),
            Some(vec![Section::MostExpensive])
        );
        assert_eq!(
            Section::select(Some("CurrentOrders")),
            Some(vec![Section::View(View::CurrentOrders)])
        );
        assert_eq!(Section::select(Some("Shippers")), None);
    }

    #[test]
    fn metadata_renders_compact_and_pretty_json() {
        let api = build_api(&northwind::config::ApiConfig::default()).expect("api builds");
        let metadata = api.metadata();

        let compact = render_metadata(&metadata, true).expect("compact renders");
        assert!(!compact.contains('\n'));
        let pretty = render_metadata(&metadata, false).expect("pretty renders");
        assert!(pretty.contains('\n'));

        let parsed: serde_json::Value = serde_json::from_str(&compact).expect("valid json");
        assert_eq!(parsed["namespace"], "NorthwindService");
    }

    #[test]
    fn most_expensive_reads_the_seed_prices() {
        let api = build_api(&northwind::config::ApiConfig::default()).expect("api builds");
        assert_eq!(api.most_expensive().expect("readable"), Some(263.5));
    }
}
