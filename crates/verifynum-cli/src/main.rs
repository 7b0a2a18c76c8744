// VerifyNum CLI - operator and developer tool for the balance API

mod client;
mod watch;
mod webhook;

use std::time::Duration;

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use verifynum_server::provider::CheckoutStatus;
use verifynum_server::reconcile::{
    pending_message, status_message, CreditSignal, Locale, PaymentFailureReason, PollOutcome,
    PollerConfig, TopupPoller,
};
use verifynum_signing::WebhookSecret;

use client::ApiClient;

/// VerifyNum - balance top-ups, verification and operator credits
#[derive(Parser)]
#[command(name = "verifynum")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Base URL of the verifynum-server
    #[arg(long, env = "VERIFYNUM_API_URL", default_value = "http://localhost:8080", global = true)]
    api_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List top-up packages and their bonuses
    Packages,
    /// Open a checkout session
    Checkout {
        #[arg(short, long)]
        user_id: String,

        /// Package id (e.g. balance_15)
        #[arg(short, long, conflicts_with = "amount")]
        package: Option<String>,

        /// Custom amount in USD
        #[arg(short, long)]
        amount: Option<String>,

        #[arg(short, long)]
        email: Option<String>,
    },
    /// Ask the server whether a checkout has been paid and credited
    Verify {
        checkout_id: String,

        #[arg(short, long)]
        user_id: String,

        /// Message language (tr, en)
        #[arg(short, long, default_value = "tr", value_parser = parse_locale)]
        locale: Locale,
    },
    /// Wait until a checkout's credit shows up in the balance
    Watch {
        checkout_id: String,

        #[arg(short, long)]
        user_id: String,

        #[arg(short, long, default_value = "tr", value_parser = parse_locale)]
        locale: Locale,

        /// Seconds between polls
        #[arg(long, default_value_t = 5)]
        interval: u64,

        #[arg(long, default_value_t = 24)]
        max_attempts: u32,

        /// Poll only; do not subscribe to the balance event stream
        #[arg(long)]
        no_stream: bool,
    },
    /// Show an account's balance
    Balance {
        user_id: String,

        /// Also list the most recent transactions
        #[arg(long, value_name = "N")]
        history: Option<usize>,
    },
    /// Operator actions (require ADMIN_API_TOKEN)
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
    /// Webhook tooling
    Webhook {
        #[command(subcommand)]
        action: WebhookAction,
    },
}

#[derive(Subcommand)]
enum AdminAction {
    /// Credit an account directly
    Credit {
        #[arg(short, long)]
        user_id: String,

        #[arg(short, long)]
        amount: String,

        #[arg(short, long)]
        note: Option<String>,

        #[arg(long, env = "ADMIN_API_TOKEN", hide_env_values = true)]
        token: String,
    },
}

#[derive(Subcommand)]
enum WebhookAction {
    /// Send a signed order.paid delivery to the server
    Send {
        #[arg(short, long)]
        checkout_id: String,

        #[arg(short, long)]
        user_id: String,

        #[arg(short, long, conflicts_with = "amount")]
        package: Option<String>,

        #[arg(short, long)]
        amount: Option<String>,

        #[arg(long, env = "POLAR_WEBHOOK_SECRET", hide_env_values = true)]
        secret: String,

        /// Print the signed delivery without sending it
        #[arg(long)]
        dry_run: bool,
    },
}

fn parse_locale(value: &str) -> Result<Locale, String> {
    match value.to_ascii_lowercase().as_str() {
        "tr" => Ok(Locale::Tr),
        "en" => Ok(Locale::En),
        other => Err(format!("unsupported locale '{}' (expected tr or en)", other)),
    }
}

fn main() {
    let cli = Cli::parse();
    let client = ApiClient::new(&cli.api_url);

    let result = match cli.command {
        Commands::Packages => handle_packages(&client),
        Commands::Checkout {
            user_id,
            package,
            amount,
            email,
        } => handle_checkout(&client, &user_id, package, amount, email),
        Commands::Verify {
            checkout_id,
            user_id,
            locale,
        } => handle_verify(&client, &checkout_id, &user_id, locale),
        Commands::Watch {
            checkout_id,
            user_id,
            locale,
            interval,
            max_attempts,
            no_stream,
        } => handle_watch(
            &client,
            &checkout_id,
            &user_id,
            locale,
            PollerConfig {
                interval: Duration::from_secs(interval),
                max_attempts,
            },
            !no_stream,
        ),
        Commands::Balance { user_id, history } => handle_balance(&client, &user_id, history),
        Commands::Admin { action } => handle_admin(&client, action),
        Commands::Webhook { action } => handle_webhook(&client, action),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn handle_packages(client: &ApiClient) -> anyhow::Result<()> {
    let response = client.packages()?;
    let packages = response["packages"]
        .as_array()
        .ok_or_else(|| anyhow!("Unexpected packages response"))?;

    println!("{:<12} {:>8} {:>6} {:>8} {:>8}", "PACKAGE", "AMOUNT", "BONUS", "EXTRA", "TOTAL");
    for package in packages {
        println!(
            "{:<12} {:>8} {:>5}% {:>8} {:>8}",
            text(&package["id"]),
            text(&package["amount"]),
            text(&package["bonusPercent"]),
            text(&package["bonusAmount"]),
            text(&package["totalCredits"]).green(),
        );
    }
    println!();
    println!("Custom amounts from {} USD", text(&response["minCustomAmount"]));
    Ok(())
}

/// Renders a JSON scalar without quotes.
fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}

fn handle_checkout(
    client: &ApiClient,
    user_id: &str,
    package: Option<String>,
    amount: Option<String>,
    email: Option<String>,
) -> anyhow::Result<()> {
    let mut body = json!({ "userId": user_id });
    if let Some(package) = package {
        body["packageId"] = json!(package);
    }
    if let Some(amount) = amount {
        body["customAmount"] = json!(amount);
    }
    if let Some(email) = email {
        body["email"] = json!(email);
    }

    let checkout = client.checkout(&body)?;
    println!("{} Checkout created", "✓".green().bold());
    println!();
    println!("  Checkout:  {}", checkout.checkout_id);
    println!("  Package:   {}", checkout.package_id);
    println!(
        "  Amount:    {} USD + {} bonus ({}%)",
        checkout.amount, checkout.bonus_amount, checkout.bonus_percent
    );
    println!("  Credits:   {}", checkout.total_credits.to_string().green());
    println!("  Pay at:    {}", checkout.checkout_url.cyan());
    if checkout.is_dev {
        println!();
        println!(
            "  {}",
            "Development checkout: no payment provider is configured, nothing will be charged"
                .yellow()
        );
    }
    Ok(())
}

fn handle_verify(
    client: &ApiClient,
    checkout_id: &str,
    user_id: &str,
    locale: Locale,
) -> anyhow::Result<()> {
    let response = client.verify(checkout_id, user_id, locale)?;

    if response.success {
        let credited = response.balance_updated == Some(true);
        let headline = if credited {
            "Payment received and credited".green()
        } else {
            "Payment received, credit pending".yellow()
        };
        println!("{} {}", "✓".green().bold(), headline);
        println!();
        if let Some(total) = &response.total_credits {
            println!("  Credits:   {}", total);
        }
        if let Some(package_id) = &response.package_id {
            println!("  Package:   {}", package_id);
        }
        if !credited {
            println!();
            println!("  {}", pending_message(locale));
        }
        return Ok(());
    }

    let message = response
        .message
        .unwrap_or_else(|| status_message(response.status, locale).to_string());
    if response.terminal {
        report_failure(response.status, &message, locale);
        return Err(anyhow!("Checkout {}", response.status.as_str()));
    }
    println!("{} {}", "…".yellow().bold(), message.yellow());
    println!("  Status:    {}", response.status.as_str());
    Ok(())
}

fn handle_watch(
    client: &ApiClient,
    checkout_id: &str,
    user_id: &str,
    locale: Locale,
    config: PollerConfig,
    stream: bool,
) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let outcome = runtime.block_on(async {
        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_interrupt.cancel();
            }
        });

        let feed = if stream {
            match watch::spawn_balance_feed(client, user_id, cancel.clone()).await {
                Ok(feed) => Some(feed),
                Err(e) => {
                    eprintln!("{} {}", "Live updates unavailable, polling only:".dimmed(), e);
                    None
                }
            }
        } else {
            None
        };

        let source = watch::HttpVerifySource::new(
            client.clone(),
            checkout_id.to_string(),
            user_id.to_string(),
            locale,
        );
        println!("Waiting for {} to be credited...", checkout_id);
        let outcome = TopupPoller::new(config)
            .run(user_id, &source, feed, cancel.clone())
            .await;
        cancel.cancel();
        outcome
    });

    match outcome {
        PollOutcome::Credited { via } => {
            println!(
                "{} {} (seen via {})",
                "✓".green().bold(),
                "Balance credited".green(),
                signal_label(via)
            );
            if let Ok(balance) = client.balance(user_id) {
                println!("  Balance:   {}", balance);
            }
            Ok(())
        }
        PollOutcome::Failed { status } => {
            report_failure(status, status_message(status, locale), locale);
            Err(anyhow!("Checkout {}", status.as_str()))
        }
        PollOutcome::Pending { attempts } => {
            println!("{} {}", "…".yellow().bold(), pending_message(locale).yellow());
            println!("  Checked {} times. Run `verifynum verify` later to confirm.", attempts);
            Ok(())
        }
        PollOutcome::Cancelled => {
            println!("{}", "Stopped.".dimmed());
            Ok(())
        }
    }
}

fn report_failure(status: CheckoutStatus, message: &str, locale: Locale) {
    let failure = PaymentFailureReason::for_status(status).message(locale);
    eprintln!("{} {}", "✗".red().bold(), failure.title.red().bold());
    eprintln!("  {}", message);
    eprintln!("  {}", failure.message.dimmed());
}

fn signal_label(via: CreditSignal) -> &'static str {
    match via {
        CreditSignal::Verifier => "verification",
        CreditSignal::BalancePoll => "balance polling",
        CreditSignal::Realtime => "live stream",
    }
}

fn handle_balance(client: &ApiClient, user_id: &str, history: Option<usize>) -> anyhow::Result<()> {
    let balance = client.balance(user_id)?;
    println!("{}  {}", user_id, balance.to_string().green().bold());

    if let Some(limit) = history {
        let transactions = client.transactions(user_id, limit)?;
        if transactions.is_empty() {
            println!("  {}", "No transactions".dimmed());
        }
        for tx in transactions {
            println!(
                "  {}  {:<12} +{:<10} -> {:<10} {}",
                tx.created_at.format("%Y-%m-%d %H:%M"),
                serde_json::to_value(tx.kind)?.as_str().unwrap_or("-"),
                tx.total_credits,
                tx.new_balance,
                tx.checkout_id
                    .or(tx.note)
                    .unwrap_or_default()
                    .dimmed()
            );
        }
    }
    Ok(())
}

fn handle_admin(client: &ApiClient, action: AdminAction) -> anyhow::Result<()> {
    match action {
        AdminAction::Credit {
            user_id,
            amount,
            note,
            token,
        } => {
            let body = json!({
                "userId": user_id,
                "amount": amount,
                "note": note,
                "source": "admin_script",
            });
            let credit = client.admin_credit(&token, &body)?;
            println!("{} {}", "✓".green().bold(), "Balance credited".green());
            println!();
            println!("  User:      {}", user_id);
            println!("  Previous:  {}", credit.previous_balance);
            println!("  Added:     {}", credit.added_amount);
            println!("  New:       {}", credit.new_balance.to_string().green());
            println!("  Tx:        {}", credit.transaction_id);
            Ok(())
        }
    }
}

fn handle_webhook(client: &ApiClient, action: WebhookAction) -> anyhow::Result<()> {
    match action {
        WebhookAction::Send {
            checkout_id,
            user_id,
            package,
            amount,
            secret,
            dry_run,
        } => {
            let secret = WebhookSecret::parse(&secret)?;
            let (quote, package_id) =
                webhook::resolve_quote(package.as_deref(), amount.as_deref())?;
            let event = webhook::order_paid_event(&checkout_id, &user_id, &quote, &package_id);
            let delivery =
                webhook::sign_delivery(&secret, &event, chrono::Utc::now().timestamp())?;
            let headers = delivery.headers();

            if dry_run {
                for (name, value) in &headers {
                    println!("{}: {}", name, value);
                }
                println!();
                println!("{}", serde_json::to_string_pretty(&event)?);
                return Ok(());
            }

            let header_refs: Vec<(&str, &str)> =
                headers.iter().map(|(name, value)| (*name, value.as_str())).collect();
            let (status, body) = client.send_webhook(&header_refs, &delivery.body)?;
            if (200..300).contains(&status) {
                println!(
                    "{} Delivered ({}): {}",
                    "✓".green().bold(),
                    status,
                    text(&body["outcome"])
                );
                Ok(())
            } else {
                eprintln!("{} Rejected ({}): {}", "✗".red().bold(), status, text(&body["error"]));
                Err(anyhow!("Webhook rejected with HTTP {}", status))
            }
        }
    }
}
