use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use client_core::{
    AsyncResult, Dispatch, Feedback, FeedbackMessages, InputField, StateSubscription, ToastLevel,
    Watchlist,
};
use shared::protocol::{Article, Coin, PricePoint};

/// Prints every transition of one dispatch until it settles.
pub async fn follow<T: Clone>(
    label: &str,
    mut sub: StateSubscription<T>,
    dispatch: Dispatch,
    messages: &FeedbackMessages,
    show: impl Fn(&T),
) -> Result<T> {
    match dispatch {
        Dispatch::Started { .. } | Dispatch::Rejected(_) => {}
        Dispatch::Ignored => bail!("{label}: already in progress"),
        Dispatch::SignedOut => bail!("{label}: sign in first"),
        Dispatch::Disposed => bail!("{label}: screen closed"),
    }

    while let Some(state) = sub.next().await {
        let feedback = Feedback::from_state(&state, messages);
        match state {
            AsyncResult::Idle => {}
            AsyncResult::Loading => println!("{label}: loading..."),
            AsyncResult::Success(value) => {
                show(&value);
                print_feedback(&feedback);
                return Ok(value);
            }
            AsyncResult::Failure(error) => {
                print_feedback(&feedback);
                bail!("{label} failed ({})", error.kind());
            }
        }
    }
    bail!("{label}: state closed before the call settled")
}

pub fn print_feedback(feedback: &Feedback) {
    if let Some(toast) = &feedback.toast {
        let tag = match toast.level {
            ToastLevel::Success => "ok",
            ToastLevel::Error => "error",
        };
        println!("[{tag}] {}", toast.message);
    }
    if let Some((field, message)) = &feedback.inline {
        println!("  {} {message}", field_label(*field));
    }
}

fn field_label(field: InputField) -> &'static str {
    match field {
        InputField::Email => "email:",
        InputField::Password => "password:",
        InputField::Image => "picture:",
        InputField::CoinId => "coin:",
        InputField::Days => "days:",
    }
}

pub fn coins(coins: &[Coin]) {
    println!("{:>4}  {:<8} {:<24} {:>14} {:>8}", "#", "SYMBOL", "NAME", "PRICE", "24H");
    for coin in coins {
        println!("{}", coin_row(coin));
    }
}

pub fn coin(coin: &Coin) {
    println!("{} ({}) rank #{}", coin.name, coin.symbol, coin.rank);
    println!("  price       {}", format_price(coin.price));
    if let Some(cap) = coin.market_cap {
        println!("  market cap  {}", format_price(cap));
    }
    if let Some(volume) = coin.volume {
        println!("  volume      {}", format_price(volume));
    }
    for (label, change) in [
        ("1h", coin.price_change1h),
        ("24h", coin.price_change1d),
        ("7d", coin.price_change1w),
    ] {
        println!("  change {label:<4} {}", format_change(change));
    }
    if let Some(url) = &coin.website_url {
        println!("  website     {url}");
    }
}

pub fn chart(points: &[PricePoint]) {
    for point in points {
        println!(
            "{}  {}",
            point.timestamp.format("%Y-%m-%d %H:%M"),
            format_price(point.price)
        );
    }
    if let (Some(first), Some(last)) = (points.first(), points.last()) {
        if first.price > 0.0 {
            let change = (last.price - first.price) / first.price * 100.0;
            println!("period change {}", format_change(Some(change)));
        }
    }
}

pub fn news(articles: &[Article]) {
    for article in articles {
        let when = article
            .published_at()
            .map(|at| format_date(&at))
            .unwrap_or_else(|| "----------".to_string());
        let source = article.source.as_deref().unwrap_or("unknown");
        println!("{when}  {} ({source})", article.title);
        if let Some(link) = &article.link {
            println!("            {link}");
        }
    }
}

pub fn watchlist(watchlist: &Watchlist) {
    if watchlist.is_empty() {
        println!("watchlist is empty");
        return;
    }
    coins(&watchlist.coins);
}

pub fn coin_row(coin: &Coin) -> String {
    format!(
        "{:>4}  {:<8} {:<24} {:>14} {:>8}",
        coin.rank,
        coin.symbol,
        coin.name,
        format_price(coin.price),
        format_change(coin.price_change1d)
    )
}

pub fn format_price(price: f64) -> String {
    if price.abs() >= 1.0 {
        format!("${price:.2}")
    } else {
        format!("${price:.6}")
    }
}

pub fn format_change(change: Option<f64>) -> String {
    match change {
        Some(change) if change > 0.0 => format!("+{change:.2}%"),
        Some(change) => format!("{change:.2}%"),
        None => "n/a".to_string(),
    }
}

fn format_date(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
#[path = "tests/render_tests.rs"]
mod tests;
