//! Market trends, portfolio, alerts, profile and settings subcommands.

use super::{Output, with_manual_retry};
use crate::api::{
    AlertQuery, AlertType, ApiClient, ClassifiedError, ErrorKind, MarketTrendsResponse,
    NewPortfolioItem, NewPriceAlert, NotificationMethod, PortfolioItem, PortfolioItemUpdate,
    PortfolioQuery, PortfolioStatus, PriceAlert, TrendQuery,
};
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
pub struct TrendsArgs {
    /// Item name or model
    pub item: String,

    #[arg(long)]
    pub platform: Option<String>,

    #[arg(long)]
    pub condition: Option<String>,

    /// Days of history (1-365)
    #[arg(short, long)]
    pub days: Option<u32>,

    /// Only the summary statistics
    #[arg(long)]
    pub summary: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusArg {
    Owned,
    Listed,
    Sold,
}

impl From<StatusArg> for PortfolioStatus {
    fn from(status: StatusArg) -> Self {
        match status {
            StatusArg::Owned => Self::Owned,
            StatusArg::Listed => Self::Listed,
            StatusArg::Sold => Self::Sold,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlertKind {
    PriceDrop,
    PriceIncrease,
    Threshold,
}

impl From<AlertKind> for AlertType {
    fn from(kind: AlertKind) -> Self {
        match kind {
            AlertKind::PriceDrop => Self::PriceDrop,
            AlertKind::PriceIncrease => Self::PriceIncrease,
            AlertKind::Threshold => Self::Threshold,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotifyArg {
    Email,
    Push,
    Both,
}

impl From<NotifyArg> for NotificationMethod {
    fn from(notify: NotifyArg) -> Self {
        match notify {
            NotifyArg::Email => Self::Email,
            NotifyArg::Push => Self::Push,
            NotifyArg::Both => Self::Both,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum PortfolioAction {
    /// List items with portfolio totals
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        per_page: u32,
        #[arg(long, value_enum)]
        status: Option<StatusArg>,
    },
    /// Show one item
    Get { id: u64 },
    /// Record a purchase
    Add {
        name: String,
        price: f64,
        /// new, excellent, very good, good, fair or poor
        #[arg(long)]
        condition: String,
        /// Purchase date, YYYY-MM-DD (default today)
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        brand: Option<String>,
        #[arg(long)]
        platform: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        /// Comma-separated
        #[arg(long)]
        tags: Option<String>,
    },
    /// Update price or status of an item
    Update {
        id: u64,
        #[arg(long, value_enum)]
        status: Option<StatusArg>,
        #[arg(long)]
        market_price: Option<f64>,
        #[arg(long)]
        listing_price: Option<f64>,
        #[arg(long)]
        listing_platform: Option<String>,
        #[arg(long)]
        sale_price: Option<f64>,
        #[arg(long)]
        sale_platform: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Remove an item
    Remove { id: u64 },
}

#[derive(Subcommand, Debug)]
pub enum AlertAction {
    /// List alerts
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// Only active alerts
        #[arg(long, conflicts_with = "inactive")]
        active: bool,
        /// Only inactive alerts
        #[arg(long)]
        inactive: bool,
        #[arg(long = "type", value_enum)]
        kind: Option<AlertKind>,
    },
    /// Show one alert
    Get { id: u64 },
    /// Create an alert
    Add {
        item: String,
        #[arg(value_enum)]
        kind: AlertKind,
        /// Required for threshold alerts
        #[arg(long)]
        threshold: Option<f64>,
        /// Required for price-drop and price-increase alerts
        #[arg(long)]
        percent: Option<f64>,
        /// Required for price-drop and price-increase alerts
        #[arg(long)]
        baseline: Option<f64>,
        #[arg(long)]
        platform: Option<String>,
        #[arg(long, value_enum)]
        notify: Option<NotifyArg>,
    },
    /// Switch an alert on or off
    Toggle { id: u64 },
    /// Delete an alert
    Remove { id: u64 },
}

#[derive(Subcommand, Debug)]
pub enum ProfileAction {
    /// Show the profile
    Show,
    /// Counts and portfolio value
    Stats,
}

#[derive(Subcommand, Debug)]
pub enum SettingsAction {
    /// Print all settings as JSON
    Show,
    /// Merge a JSON object into the settings
    Set { changes: String },
    /// Restore defaults
    Reset,
}

pub(super) async fn trends(
    client: &ApiClient,
    args: &TrendsArgs,
    out: &Output,
    interactive: bool,
) -> Result<(), ClassifiedError> {
    let query = TrendQuery {
        platform: args.platform.clone(),
        condition: args.condition.clone(),
        days_back: args.days,
    };
    if args.summary {
        let fetched =
            with_manual_retry(interactive, || client.market_summary(&args.item, &query)).await?;
        out.fetched(&fetched, |response| match &response.summary {
            Some(s) => format!(
                "{}: avg {:.2}, median {:.2}, range {:.2}-{:.2} over {} points\n",
                response.item_identifier, s.average, s.median, s.lowest, s.highest, s.count
            ),
            None => format!("{}: no price data\n", response.item_identifier),
        });
    } else {
        let fetched =
            with_manual_retry(interactive, || client.market_trends(&args.item, &query)).await?;
        out.fetched(&fetched, format_trends);
    }
    Ok(())
}

pub(super) async fn portfolio(
    client: &ApiClient,
    action: PortfolioAction,
    out: &Output,
    interactive: bool,
) -> Result<(), ClassifiedError> {
    match action {
        PortfolioAction::List {
            page,
            per_page,
            status,
        } => {
            let query = PortfolioQuery {
                page,
                per_page,
                status: status.map(Into::into),
                ..Default::default()
            };
            let fetched = with_manual_retry(interactive, || client.portfolio(&query)).await?;
            out.fetched(&fetched, |response| {
                let s = &response.summary;
                let mut text = format!(
                    "{} items ({} owned, {} listed, {} sold)  invested {:.2}  value {:.2}  P/L {:+.2} ({:+.1}%)\n",
                    s.total_items,
                    s.owned_items,
                    s.listed_items,
                    s.sold_items,
                    s.total_investment,
                    s.current_value,
                    s.total_profit_loss,
                    s.profit_percentage
                );
                for item in &response.items {
                    text.push_str(&format_portfolio_item(item));
                }
                text
            });
        }
        PortfolioAction::Get { id } => {
            let item = with_manual_retry(interactive, || client.portfolio_item(id)).await?;
            out.message(&item, format_portfolio_item(&item).trim_end());
        }
        PortfolioAction::Add {
            name,
            price,
            condition,
            date,
            brand,
            platform,
            notes,
            tags,
        } => {
            let item = NewPortfolioItem {
                item_name: name,
                purchase_price: price,
                purchase_date: date
                    .unwrap_or_else(|| chrono::Local::now().date_naive().to_string()),
                condition,
                brand,
                model: None,
                size: None,
                color: None,
                category: None,
                purchase_platform: platform,
                purchase_location: None,
                notes,
                tags,
            };
            let response =
                with_manual_retry(interactive, || client.add_portfolio_item(&item)).await?;
            out.message(&response, &response.message);
        }
        PortfolioAction::Update {
            id,
            status,
            market_price,
            listing_price,
            listing_platform,
            sale_price,
            sale_platform,
            notes,
        } => {
            let update = PortfolioItemUpdate {
                status: status.map(Into::into),
                current_market_price: market_price,
                listing_price,
                listing_platform,
                sale_price,
                sale_platform,
                notes,
                ..Default::default()
            };
            if update == PortfolioItemUpdate::default() {
                eprintln!("Nothing to update");
                return Ok(());
            }
            let response =
                with_manual_retry(interactive, || client.update_portfolio_item(id, &update))
                    .await?;
            out.message(&response, &response.message);
        }
        PortfolioAction::Remove { id } => {
            let response =
                with_manual_retry(interactive, || client.delete_portfolio_item(id)).await?;
            out.message(&response, &response.message);
        }
    }
    Ok(())
}

pub(super) async fn alerts(
    client: &ApiClient,
    action: AlertAction,
    out: &Output,
    interactive: bool,
) -> Result<(), ClassifiedError> {
    match action {
        AlertAction::List {
            page,
            active,
            inactive,
            kind,
        } => {
            let query = AlertQuery {
                page,
                is_active: (active || inactive).then_some(active),
                alert_type: kind.map(Into::into),
                ..Default::default()
            };
            let fetched = with_manual_retry(interactive, || client.alerts(&query)).await?;
            out.fetched(&fetched, |response| {
                let s = &response.stats;
                let mut text = format!(
                    "{} alerts ({} active, {} triggered)\n",
                    s.total_alerts, s.active_alerts, s.triggered_alerts
                );
                for alert in &response.alerts {
                    text.push_str(&format_alert(alert));
                }
                text
            });
        }
        AlertAction::Get { id } => {
            let alert = with_manual_retry(interactive, || client.alert(id)).await?;
            out.message(&alert, format_alert(&alert).trim_end());
        }
        AlertAction::Add {
            item,
            kind,
            threshold,
            percent,
            baseline,
            platform,
            notify,
        } => {
            let alert = NewPriceAlert {
                item_identifier: item,
                alert_type: kind.into(),
                platform,
                condition: None,
                threshold_price: threshold,
                percentage_change: percent,
                notification_method: notify.map(Into::into),
                baseline_price: baseline,
                notes: None,
            };
            let response = with_manual_retry(interactive, || client.create_alert(&alert)).await?;
            out.message(&response, &response.message);
        }
        AlertAction::Toggle { id } => {
            let response = with_manual_retry(interactive, || client.toggle_alert(id)).await?;
            out.message(&response, &response.message);
        }
        AlertAction::Remove { id } => {
            let response = with_manual_retry(interactive, || client.delete_alert(id)).await?;
            out.message(&response, &response.message);
        }
    }
    Ok(())
}

pub(super) async fn profile(
    client: &ApiClient,
    action: ProfileAction,
    out: &Output,
    interactive: bool,
) -> Result<(), ClassifiedError> {
    match action {
        ProfileAction::Show => {
            let response = with_manual_retry(interactive, || client.profile()).await?;
            let p = &response.profile;
            let name = [p.first_name.as_deref(), p.last_name.as_deref()]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ");
            out.message(&response, &format!("{} <{}> {name}", p.username, p.email));
        }
        ProfileAction::Stats => {
            let response = with_manual_retry(interactive, || client.profile_stats()).await?;
            let s = &response.stats;
            out.message(
                &response,
                &format!(
                    "saved {}  portfolio {}  active alerts {}  searches {}  P/L {:+.2}",
                    s.saved_items,
                    s.portfolio_items,
                    s.active_alerts,
                    s.total_searches,
                    s.portfolio_value.profit_loss
                ),
            );
        }
    }
    Ok(())
}

pub(super) async fn settings(
    client: &ApiClient,
    action: SettingsAction,
    out: &Output,
    interactive: bool,
) -> Result<(), ClassifiedError> {
    let response = match action {
        SettingsAction::Show => with_manual_retry(interactive, || client.settings()).await?,
        SettingsAction::Set { changes } => {
            let changes: serde_json::Value = serde_json::from_str(&changes).map_err(|e| {
                ClassifiedError::new(ErrorKind::Validation)
                    .with_details(format!("Invalid settings JSON: {e}"))
            })?;
            with_manual_retry(interactive, || client.update_settings(&changes)).await?
        }
        SettingsAction::Reset => with_manual_retry(interactive, || client.reset_settings()).await?,
    };
    let text = serde_json::to_string_pretty(&response.settings).unwrap_or_default();
    out.message(&response, &text);
    Ok(())
}

fn format_trends(response: &MarketTrendsResponse) -> String {
    let mut text = format!(
        "{} over {} days\n",
        response.item_identifier, response.time_range_days
    );
    for point in &response.trends {
        let price = point
            .price
            .map_or_else(|| "-".to_string(), |p| format!("{p:.2}"));
        text.push_str(&format!(
            "  {}  {price} {}  {} listed, {} sold\n",
            point.recorded_at.as_deref().unwrap_or("?"),
            point.currency,
            point.listing_count,
            point.sold_count
        ));
    }
    if let Some(s) = &response.summary {
        text.push_str(&format!(
            "avg {:.2}  median {:.2}  low {:.2}  high {:.2}\n",
            s.average, s.median, s.lowest, s.highest
        ));
    }
    text
}

fn format_portfolio_item(item: &PortfolioItem) -> String {
    let price = |p: Option<f64>| p.map_or_else(|| "-".to_string(), |p| format!("{p:.2}"));
    format!(
        "{:>5}  {:<6}  {} -> {}  {}  ({})\n",
        item.id,
        item.status.to_string(),
        price(item.purchase_price),
        price(item.current_market_price.or(item.sale_price)),
        item.item_name,
        item.condition
    )
}

fn format_alert(alert: &PriceAlert) -> String {
    let rule = match alert.alert_type {
        AlertType::Threshold => format!(
            "at {}",
            alert
                .threshold_price
                .map_or_else(|| "?".to_string(), |p| format!("{p:.2}"))
        ),
        kind => format!(
            "{kind} {}% from {}",
            alert.percentage_change.unwrap_or_default(),
            alert
                .baseline_price
                .map_or_else(|| "?".to_string(), |p| format!("{p:.2}"))
        ),
    };
    format!(
        "{:>5}  {}  {}  {rule}\n",
        alert.id,
        if alert.is_active { "on " } else { "off" },
        alert.item_identifier
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};

    #[test]
    fn test_parse_alert_add() {
        let cli = Cli::try_parse_from([
            "fliplens", "alerts", "add", "iPhone 12", "price-drop", "--percent", "10",
            "--baseline", "250",
        ])
        .unwrap();
        let Commands::Alerts {
            action: AlertAction::Add {
                kind,
                percent,
                baseline,
                threshold,
                ..
            },
        } = cli.command
        else {
            panic!("expected alerts add");
        };
        assert_eq!(kind, AlertKind::PriceDrop);
        assert_eq!(percent, Some(10.0));
        assert_eq!(baseline, Some(250.0));
        assert_eq!(threshold, None);
    }

    #[test]
    fn test_active_and_inactive_conflict() {
        assert!(
            Cli::try_parse_from(["fliplens", "alerts", "list", "--active", "--inactive"]).is_err()
        );
    }

    #[test]
    fn test_parse_portfolio_update_status() {
        let cli = Cli::try_parse_from([
            "fliplens", "portfolio", "update", "3", "--status", "sold", "--sale-price", "210",
        ])
        .unwrap();
        let Commands::Portfolio {
            action: PortfolioAction::Update {
                id,
                status,
                sale_price,
                ..
            },
        } = cli.command
        else {
            panic!("expected portfolio update");
        };
        assert_eq!(id, 3);
        assert_eq!(PortfolioStatus::from(status.unwrap()), PortfolioStatus::Sold);
        assert_eq!(sale_price, Some(210.0));
    }

    #[test]
    fn test_format_alert_lines() {
        let alert: PriceAlert = serde_json::from_value(serde_json::json!({
            "id": 5,
            "item_identifier": "iPhone 12",
            "alert_type": "price_drop",
            "percentage_change": 10.0,
            "baseline_price": 250.0,
            "is_active": true
        }))
        .unwrap();
        assert_eq!(
            format_alert(&alert),
            "    5  on   iPhone 12  price_drop 10% from 250.00\n"
        );
    }
}
