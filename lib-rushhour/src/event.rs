//! Event record synthesis.
//!
//! One call fills a complete, internally consistent user-behavior record for
//! a chosen user: correlated categorical fields (page follows action, OS and
//! user agent follow device), truncated-normal numeric fields that cannot
//! produce impossible values, and a status/success pair drawn jointly so the
//! flag always matches the code class.
//!
//! Every weighted categorical table is a [`WeightedIndex`] built once at
//! construction and queried via cumulative search per draw; the per-event
//! work is a handful of O(log k) lookups. Identifier fields are fresh random
//! tokens from the caller's generator — no collision checking, the id space
//! is assumed large enough.

use jiff::{SignedDuration, Timestamp};
use rand::Rng;
use rand_distr::weighted::{Error as WeightedError, WeightedIndex};
use rand_distr::{Distribution, Normal, NormalError};
use serde::Serialize;
use uuid::Builder;

use crate::helpers::{hex_token, rfc3339_millis};

const SCHEMA_VERSION: u32 = 2;
const CURRENCY: &str = "KRW";
const LOCALE: &str = "ko-KR";
const TIMEZONE: &str = "Asia/Seoul";

/// Event occurrence scatters around "now": up to 90s late-arriving, up to
/// 30s of client clock skew into the future.
const EVENT_OFFSET_MS: std::ops::RangeInclusive<i64> = -90_000..=30_000;
/// Ingest trails the event by pipeline delay.
const INGEST_DELAY_MS: std::ops::RangeInclusive<i64> = 5..=500;

const LOGGED_IN_PERCENT: u8 = 75;
const UTM_TAGGED_PERCENT: u8 = 70;

const LATENCY_MEAN: f64 = 120.0;
const LATENCY_STDDEV: f64 = 60.0;
const LATENCY_MIN: f64 = 5.0;
const LATENCY_MAX: f64 = 2_000.0;

const PURCHASE_MEAN: f64 = 35_000.0;
const PURCHASE_STDDEV: f64 = 20_000.0;
const PURCHASE_MIN: f64 = 1_000.0;
const PURCHASE_MAX: f64 = 500_000.0;
/// Monetary values land on 100-minor-unit increments.
const PURCHASE_STEP: f64 = 100.0;

const SERVICES: &[&str] = &["web-frontend", "checkout", "catalog", "auth"];

const ACTIONS: &[&str] = &["pageview", "click", "view_item", "add_to_cart", "purchase"];
const ACTION_WEIGHTS: &[u32] = &[40, 30, 15, 10, 5];

const GENERAL_PAGES: &[&str] = &[
    "/",
    "/search?q=abc",
    "/search?q=shoes",
    "/category/men",
    "/category/women",
    "/product/42",
    "/product/77",
    "/cart",
    "/checkout",
];
const CART_PAGES: &[&str] = &["/product/42", "/product/77", "/cart", "/checkout"];
const CART_PAGE_WEIGHTS: &[u32] = &[40, 30, 20, 10];
const VIEW_PAGES: &[&str] = &["/product/42", "/product/77"];
const VIEW_PAGE_WEIGHTS: &[u32] = &[60, 40];

const FALLBACK_PRODUCT_IDS: &[&str] = &["", "42", "77", "13", "108"];
const FALLBACK_PRODUCT_WEIGHTS: &[u32] = &[50, 20, 15, 10, 5];

const DEVICES: &[&str] = &["ios", "android", "web"];
const DEVICE_WEIGHTS: &[u32] = &[40, 40, 20];

const IOS_VERSIONS: &[&str] = &["16.7", "17.0", "17.4", "17.5", "18.0"];
const IOS_VERSION_WEIGHTS: &[u32] = &[10, 20, 25, 30, 15];
const ANDROID_VERSIONS: &[&str] = &["12", "13", "14"];
const ANDROID_VERSION_WEIGHTS: &[u32] = &[20, 45, 35];
const MACOS_VERSIONS: &[&str] = &["12.7", "13.6", "14.5"];
const MACOS_VERSION_WEIGHTS: &[u32] = &[20, 40, 40];

const APP_VERSIONS: &[&str] = &["5.2.0", "5.3.1", "5.4.0"];
const APP_VERSION_WEIGHTS: &[u32] = &[20, 60, 20];

const REGIONS: &[&str] = &["KR", "US", "JP"];
const REGION_WEIGHTS: &[u32] = &[90, 7, 3];

const NETWORK_TYPES: &[&str] = &["wifi", "cellular", "ethernet"];
const NETWORK_WEIGHTS: &[u32] = &[80, 19, 1];

const REFERRERS: &[&str] =
    &["/", "/search?q=abc", "/search?q=best+deal", "/category/men", "/category/women", ""];
const REFERRER_WEIGHTS: &[u32] = &[10, 30, 20, 15, 15, 10];

const UTM_SOURCES: &[&str] = &["naver", "google", "kakao", "facebook", "newsletter"];
const UTM_MEDIUMS: &[&str] = &["cpc", "organic", "email", "social"];
const UTM_MEDIUM_WEIGHTS: &[u32] = &[50, 20, 15, 15];
const UTM_CAMPAIGNS: &[&str] = &["fall_sale", "brand_kw", "retargeting", "weekly_digest"];

const CLIENT_ERROR_CODES: &[u16] = &[400, 401, 403, 404];
const SERVER_ERROR_CODES: &[u16] = &[500, 502, 503, 504];

#[derive(Debug)]
pub enum Error {
    Weights(WeightedError),
    Normal(NormalError),
}

map_err!(Weights, WeightedError);
map_err!(Normal, NormalError);

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Weights(e) => write!(f, "weighted table: {e}"),
            Self::Normal(e) => write!(f, "normal distribution: {e}"),
        }
    }
}

impl std::error::Error for Error {}

/// One synthesized user-behavior event, schema version 2. Records are
/// created fresh per event and dropped after submission.
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    pub event_id: String,
    pub schema_version: u32,
    pub event_time: String,
    pub ingest_time: String,
    pub service: String,
    pub trace_id: String,
    pub span_id: String,

    pub user_id: String,
    pub anonymous_id: String,
    pub user_logged_in: bool,
    pub session_id: String,

    pub action: String,
    pub page: String,
    pub product_id: String,
    pub device: String,
    pub os: String,
    pub os_version: String,
    pub app_version: String,
    pub user_agent: String,
    pub locale: String,
    pub timezone: String,
    pub region: String,
    pub network_type: String,

    pub latency_ms: u32,
    pub status_code: u16,
    pub success: bool,
    pub value: f64,
    pub currency: String,

    pub referrer: String,
    pub utm_source: String,
    pub utm_medium: String,
    pub utm_campaign: String,
}

/// Weighted discrete distribution over a static value list, built once and
/// queried via cumulative search.
struct Choice<T: Copy + 'static> {
    values: &'static [T],
    index: WeightedIndex<u32>,
}

impl<T: Copy + 'static> Choice<T> {
    fn new(values: &'static [T], weights: &'static [u32]) -> Result<Self, WeightedError> {
        Ok(Self { values, index: WeightedIndex::new(weights)? })
    }

    fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> T {
        self.values[self.index.sample(rng)]
    }
}

fn uniform<T: Copy, R: Rng + ?Sized>(rng: &mut R, values: &[T]) -> T {
    values[rng.random_range(0..values.len())]
}

pub struct Synthesizer {
    action: Choice<&'static str>,
    cart_page: Choice<&'static str>,
    view_page: Choice<&'static str>,
    fallback_product: Choice<&'static str>,
    device: Choice<&'static str>,
    ios_version: Choice<&'static str>,
    android_version: Choice<&'static str>,
    macos_version: Choice<&'static str>,
    app_version: Choice<&'static str>,
    region: Choice<&'static str>,
    network: Choice<&'static str>,
    referrer: Choice<&'static str>,
    utm_medium: Choice<&'static str>,
    latency: Normal<f64>,
    purchase_value: Normal<f64>,
}

impl Synthesizer {
    pub fn new() -> Result<Self, Error> {
        Ok(Self {
            action: Choice::new(ACTIONS, ACTION_WEIGHTS)?,
            cart_page: Choice::new(CART_PAGES, CART_PAGE_WEIGHTS)?,
            view_page: Choice::new(VIEW_PAGES, VIEW_PAGE_WEIGHTS)?,
            fallback_product: Choice::new(FALLBACK_PRODUCT_IDS, FALLBACK_PRODUCT_WEIGHTS)?,
            device: Choice::new(DEVICES, DEVICE_WEIGHTS)?,
            ios_version: Choice::new(IOS_VERSIONS, IOS_VERSION_WEIGHTS)?,
            android_version: Choice::new(ANDROID_VERSIONS, ANDROID_VERSION_WEIGHTS)?,
            macos_version: Choice::new(MACOS_VERSIONS, MACOS_VERSION_WEIGHTS)?,
            app_version: Choice::new(APP_VERSIONS, APP_VERSION_WEIGHTS)?,
            region: Choice::new(REGIONS, REGION_WEIGHTS)?,
            network: Choice::new(NETWORK_TYPES, NETWORK_WEIGHTS)?,
            referrer: Choice::new(REFERRERS, REFERRER_WEIGHTS)?,
            utm_medium: Choice::new(UTM_MEDIUMS, UTM_MEDIUM_WEIGHTS)?,
            latency: Normal::new(LATENCY_MEAN, LATENCY_STDDEV)?,
            purchase_value: Normal::new(PURCHASE_MEAN, PURCHASE_STDDEV)?,
        })
    }

    /// Produces one complete record for the given user at the given time.
    pub fn synthesize<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        user_display_id: &str,
        now: Timestamp,
    ) -> EventRecord {
        let event_time = now
            .saturating_add(SignedDuration::from_millis(rng.random_range(EVENT_OFFSET_MS)))
            .expect("event time offset within timestamp range");
        let ingest_time = event_time
            .saturating_add(SignedDuration::from_millis(rng.random_range(INGEST_DELAY_MS)))
            .expect("ingest delay within timestamp range");

        let action = self.action.pick(rng);
        let page = self.page_for(rng, action);
        let product_id = self.product_id_for(rng, page);

        let device = self.device.pick(rng);
        let (os, os_version, app_version, user_agent) = self.device_profile(rng, device);

        let (status_code, success) = status(rng);
        let latency_ms =
            self.latency.sample(rng).clamp(LATENCY_MIN, LATENCY_MAX).round() as u32;

        let value = if action == "purchase" {
            let raw = self.purchase_value.sample(rng).clamp(PURCHASE_MIN, PURCHASE_MAX);
            (raw / PURCHASE_STEP).round() * PURCHASE_STEP
        } else {
            0.0
        };

        let user_logged_in = rng.random_range(0..100) < LOGGED_IN_PERCENT;
        let user_id = if user_logged_in { user_display_id.to_owned() } else { String::new() };

        let (utm_source, utm_medium, utm_campaign) = self.utm_tags(rng);

        EventRecord {
            event_id: event_id(rng),
            schema_version: SCHEMA_VERSION,
            event_time: rfc3339_millis(event_time),
            ingest_time: rfc3339_millis(ingest_time),
            service: uniform(rng, SERVICES).to_owned(),
            trace_id: hex_token(rng, 16),
            span_id: hex_token(rng, 8),

            user_id,
            anonymous_id: format!("anon_{}", hex_token(rng, 6)),
            user_logged_in,
            session_id: format!("s_{:04}", rng.random_range(0..10_000)),

            action: action.to_owned(),
            page: page.to_owned(),
            product_id: product_id.to_owned(),
            device: device.to_owned(),
            os: os.to_owned(),
            os_version: os_version.to_owned(),
            app_version: app_version.to_owned(),
            user_agent,
            locale: LOCALE.to_owned(),
            timezone: TIMEZONE.to_owned(),
            region: self.region.pick(rng).to_owned(),
            network_type: self.network.pick(rng).to_owned(),

            latency_ms,
            status_code,
            success,
            value,
            currency: CURRENCY.to_owned(),

            referrer: self.referrer.pick(rng).to_owned(),
            utm_source,
            utm_medium,
            utm_campaign,
        }
    }

    // Commerce actions land on product/cart/checkout pages; everything else
    // browses the whole site.
    fn page_for<R: Rng + ?Sized>(&self, rng: &mut R, action: &str) -> &'static str {
        match action {
            "purchase" | "add_to_cart" => self.cart_page.pick(rng),
            "view_item" => self.view_page.pick(rng),
            _ => uniform(rng, GENERAL_PAGES),
        }
    }

    fn product_id_for<R: Rng + ?Sized>(&self, rng: &mut R, page: &'static str) -> &'static str {
        match page.strip_prefix("/product/") {
            Some(id) => id,
            None => self.fallback_product.pick(rng),
        }
    }

    fn device_profile<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        device: &str,
    ) -> (&'static str, &'static str, &'static str, String) {
        match device {
            "ios" => {
                let version = self.ios_version.pick(rng);
                let ua = format!(
                    "Mozilla/5.0 (iPhone; CPU iPhone OS {version} like Mac OS X) \
                     AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1"
                );
                ("iOS", version, self.app_version.pick(rng), ua)
            }
            "android" => {
                let version = self.android_version.pick(rng);
                let ua = format!(
                    "Mozilla/5.0 (Linux; Android {version}) AppleWebKit/537.36 \
                     (KHTML, like Gecko) Chrome/124.0 Mobile Safari/537.36"
                );
                ("Android", version, self.app_version.pick(rng), ua)
            }
            _ => {
                let version = self.macos_version.pick(rng);
                let ua = format!(
                    "Mozilla/5.0 (Macintosh; Intel Mac OS X {version}) AppleWebKit/537.36 \
                     (KHTML, like Gecko) Chrome/124.0 Safari/537.36"
                );
                ("macOS", version, "web", ua)
            }
        }
    }

    fn utm_tags<R: Rng + ?Sized>(&self, rng: &mut R) -> (String, String, String) {
        if rng.random_range(0..100) < UTM_TAGGED_PERCENT {
            (
                uniform(rng, UTM_SOURCES).to_owned(),
                self.utm_medium.pick(rng).to_owned(),
                uniform(rng, UTM_CAMPAIGNS).to_owned(),
            )
        } else {
            (String::new(), String::new(), String::new())
        }
    }
}

// 92% success, 4% client error, 4% server error; the flag is derived from
// the code class, never drawn independently.
fn status<R: Rng + ?Sized>(rng: &mut R) -> (u16, bool) {
    let roll = rng.random_range(0..100);
    if roll < 92 {
        (200, true)
    } else if roll < 96 {
        (uniform(rng, CLIENT_ERROR_CODES), false)
    } else {
        (uniform(rng, SERVER_ERROR_CODES), false)
    }
}

fn event_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    let bytes: [u8; 16] = rng.random();
    Builder::from_random_bytes(bytes).into_uuid().to_string()
}

/// Serializes one record for the sink; pretty output is the human-readable
/// echo mode.
pub fn encode(record: &EventRecord, pretty: bool) -> Result<Vec<u8>, serde_json::Error> {
    if pretty { serde_json::to_vec_pretty(record) } else { serde_json::to_vec(record) }
}
