use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use drainline_checkout::{
    checkout::{
        load_confirmation, CheckoutApi, CheckoutFlow, CheckoutOptions, CheckoutView,
        ConfirmationView, HttpCheckoutApi, Identity, OrderReference, PaymentForm,
        PaymentFormState, ShippingStatus, StripeConfirmer,
    },
    models::{AddressField, Country, ProductCode, QuoteDestination, ShippingQuoteRequest},
};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;
use url::Url;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    drainline_checkout::config::init_tracing(if cli.verbose { "debug" } else { "warn" }, false);

    let api = HttpCheckoutApi::new(&cli.server, Duration::from_secs(cli.timeout_secs))
        .map_err(|e| anyhow!("invalid server URL: {}", e))?;

    match cli.command {
        Commands::Price(args) => handle_price(&api, args, cli.json).await?,
        Commands::Quote(args) => handle_quote(&api, args, cli.json).await?,
        Commands::Order(args) => handle_order(&api, args, cli.json).await?,
        Commands::Checkout(args) => handle_checkout(api, &cli.server, args, cli.json).await?,
    }

    Ok(())
}

#[derive(Parser)]
#[command(
    name = "drainline",
    about = "DrainLine checkout CLI: price lookups, shipping quotes and scripted checkouts",
    version
)]
struct Cli {
    #[arg(
        long,
        global = true,
        default_value = "http://localhost:8080",
        help = "Base URL of the checkout server"
    )]
    server: String,
    #[arg(long, global = true, default_value_t = 15, help = "HTTP timeout in seconds")]
    timeout_secs: u64,
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON when available"
    )]
    json: bool,
    #[arg(long, global = true, action = ArgAction::SetTrue, help = "Log request details")]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Tier price and checkout link for a product
    Price(PriceArgs),
    /// Shipping cost to a destination
    Quote(QuoteArgs),
    /// Order details for a payment intent or checkout session
    Order(OrderArgs),
    /// Run a full checkout session against the server
    Checkout(CheckoutArgs),
}

#[derive(Args)]
struct PriceArgs {
    #[arg(long, help = "Product code (mini, sensor, bundle)")]
    product: ProductCode,
    #[arg(long, default_value_t = 1)]
    quantity: u32,
}

#[derive(Args, Clone)]
struct DestinationArgs {
    #[arg(long)]
    city: String,
    #[arg(long)]
    state: String,
    #[arg(long)]
    zip: String,
    #[arg(long, default_value = "US", help = "US or CA")]
    country: Country,
}

#[derive(Args)]
struct QuoteArgs {
    #[arg(long)]
    product: ProductCode,
    #[arg(long, default_value_t = 1)]
    quantity: u32,
    #[command(flatten)]
    destination: DestinationArgs,
}

#[derive(Args)]
struct OrderArgs {
    #[arg(long, conflicts_with = "session_id", required_unless_present = "session_id")]
    payment_intent: Option<String>,
    #[arg(long)]
    session_id: Option<String>,
}

#[derive(Args)]
struct CheckoutArgs {
    #[arg(long)]
    product: ProductCode,
    #[arg(long, default_value_t = 1)]
    quantity: u32,
    #[arg(long)]
    name: String,
    #[arg(long)]
    email: String,
    #[arg(long)]
    line1: String,
    #[arg(long, default_value = "")]
    line2: String,
    #[command(flatten)]
    destination: DestinationArgs,
    #[arg(long, help = "Attribute the order to this user id")]
    user_id: Option<String>,
    #[arg(long, default_value_t = 500, help = "Quiet period before reconciling, in ms")]
    debounce_ms: u64,
    #[arg(long, default_value_t = 30, help = "Seconds to wait for the payment intent")]
    wait_secs: u64,
    #[arg(
        long,
        requires = "publishable_key",
        help = "Confirm with this Stripe payment method (e.g. pm_card_visa)"
    )]
    pay_with: Option<String>,
    #[arg(long, env = "STRIPE_PUBLISHABLE_KEY", hide_env_values = true)]
    publishable_key: Option<String>,
    #[arg(long, default_value = "https://api.stripe.com")]
    stripe_api_base: String,
}

async fn handle_price(api: &HttpCheckoutApi, args: PriceArgs, json: bool) -> Result<()> {
    let quote = api
        .price_lookup(args.product, args.quantity)
        .await
        .context("price lookup failed")?;

    if json {
        print_json(&quote)?;
    } else {
        println!(
            "{} x{} @ ${} each (price {})",
            quote.product_name, quote.quantity, quote.unit_price, quote.price_id
        );
        println!("Checkout: {}", quote.checkout_url);
    }
    Ok(())
}

async fn handle_quote(api: &HttpCheckoutApi, args: QuoteArgs, json: bool) -> Result<()> {
    let destination = args.destination;
    let request = ShippingQuoteRequest {
        address: QuoteDestination {
            city: destination.city,
            state: destination.state,
            postal_code: destination.zip,
            country: destination.country,
        },
        products: BTreeMap::from([(args.product, args.quantity)]),
    };
    let response = api
        .shipping_quote(&request)
        .await
        .context("shipping quote failed")?;

    if json {
        print_json(&response)?;
    } else {
        println!("Shipping: ${}", response.cost);
    }
    Ok(())
}

async fn handle_order(api: &HttpCheckoutApi, args: OrderArgs, json: bool) -> Result<()> {
    let reference = match (args.payment_intent, args.session_id) {
        (Some(id), _) => OrderReference::PaymentIntent(id),
        (None, Some(id)) => OrderReference::CheckoutSession(id),
        (None, None) => bail!("pass --payment-intent or --session-id"),
    };

    match load_confirmation(api, Some(&reference)).await {
        ConfirmationView::Details(summary) if json => print_json(&summary)?,
        ConfirmationView::Details(summary) => {
            println!(
                "Order {} • {} • {} {}",
                reference.id(),
                summary.payment_status,
                summary.amount_total,
                summary.currency.to_uppercase()
            );
            for item in &summary.line_items {
                println!("- {} x{} • {}", item.description, item.quantity, item.amount_total);
            }
            if let Some(shipping) = &summary.shipping {
                let parts = [
                    &shipping.name,
                    &shipping.line1,
                    &shipping.line2,
                    &shipping.city,
                    &shipping.state,
                    &shipping.postal_code,
                ];
                let address: Vec<&str> = parts.iter().filter_map(|p| p.as_deref()).collect();
                println!("Ship to: {}", address.join(", "));
            }
        }
        ConfirmationView::ThankYou | ConfirmationView::Loading => {
            println!("Thank you for your order! Details are not available right now.");
        }
    }
    Ok(())
}

async fn handle_checkout(
    api: HttpCheckoutApi,
    server: &str,
    args: CheckoutArgs,
    json: bool,
) -> Result<()> {
    let quote = api
        .price_lookup(args.product, args.quantity)
        .await
        .context("price lookup failed")?;
    let checkout_url = Url::parse(&quote.checkout_url).context("server returned a bad checkout URL")?;
    let query = checkout_url.query().unwrap_or_default().to_string();
    debug!(%query, "starting checkout");

    let identity = Identity {
        user_id: args.user_id.clone(),
        email: args.user_id.as_ref().map(|_| args.email.clone()),
        name: None,
    };
    let options = CheckoutOptions {
        debounce: Duration::from_millis(args.debounce_ms),
        ..CheckoutOptions::default()
    };
    let flow = CheckoutFlow::start(&query, identity, Arc::new(api), options)
        .map_err(|e| anyhow!("checkout link rejected ({}); go to {}", e, e.redirect()))?;

    let destination = args.destination;
    flow.set_field(AddressField::Name, args.name);
    flow.set_field(AddressField::Email, args.email);
    flow.set_field(AddressField::Line1, args.line1);
    flow.set_field(AddressField::Line2, args.line2);
    flow.set_field(AddressField::City, destination.city);
    flow.set_field(AddressField::State, destination.state);
    flow.edit_address(move |address| {
        address.zip = destination.zip;
        address.country = destination.country;
    });

    let mut updates = flow.subscribe();
    let view: CheckoutView = tokio::time::timeout(
        Duration::from_secs(args.wait_secs),
        updates.wait_for(|view| {
            view.payment_ready()
                || view.blocking_error.is_some()
                || view.email_error.is_some()
                || view.shipping == ShippingStatus::Unavailable
        }),
    )
    .await
    .context("timed out waiting for the payment intent")?
    .map_err(|_| anyhow!("checkout session ended unexpectedly"))?
    .clone();

    if let Some(message) = &view.email_error {
        bail!("email rejected: {}", message);
    }
    if let Some(message) = &view.blocking_error {
        bail!("could not start payment: {}", message);
    }
    if view.shipping == ShippingStatus::Unavailable {
        bail!("shipping is unavailable for this address");
    }

    if json {
        print_json(&view)?;
    } else {
        render_view(&view);
    }

    if let (Some(payment_method), Some(publishable_key)) = (args.pay_with, args.publishable_key) {
        let confirmer = StripeConfirmer::new(
            publishable_key,
            payment_method,
            &args.stripe_api_base,
            Duration::from_secs(30),
        )
        .context("could not set up the payment confirmer")?;
        let site_url = Url::parse(server).context("invalid server URL")?;
        let mut form = PaymentForm::new(Arc::new(confirmer), flow.subscribe(), site_url);

        match form.submit().await {
            PaymentFormState::Succeeded(id) => println!("Payment succeeded: {}", id),
            PaymentFormState::Redirecting(url) => {
                println!("Additional authentication required: {}", url)
            }
            PaymentFormState::Failed(message) => bail!("payment failed: {}", message),
            PaymentFormState::Ready | PaymentFormState::Submitting => {}
        }
    }

    Ok(())
}

fn render_view(view: &CheckoutView) {
    let totals = &view.totals;
    println!(
        "{} x{} • subtotal ${}",
        view.cart.product_name, view.cart.quantity, totals.subtotal
    );
    match totals.shipping {
        Some(cost) => println!("Shipping: ${}", cost),
        None => println!("Shipping: pending"),
    }
    for detail in &view.tax_details {
        println!("Tax ({} {}%): ${}", detail.rate, detail.percentage, detail.amount);
    }
    println!("Total: ${}", totals.total);
    if totals.charge_differs {
        println!(
            "Note: the payment will be ${}, not the ${} estimated from the link price",
            totals.total, totals.estimated_total
        );
    }
    if let Some(id) = &view.payment_intent_id {
        println!("Payment intent: {}", id);
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
