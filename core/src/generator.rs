//! Rule-governed synthetic transaction generator.
//!
//! Normal rows are drawn consistently with the owning customer's
//! profile. Anomalous rows break at least one profile dimension
//! (amount, hour, destination country) by construction.
//!
//! Streams (see rng.rs):
//!   profiles     — profile creation only
//!   normal_rows  — every draw for a normal row
//!   anomaly_rows — every draw for an anomalous row
//!   shuffle      — the single post-merge shuffle

use crate::{
    config::GeneratorConfig,
    error::DetectResult,
    profile::{CustomerProfile, CustomerProfileStore},
    rng::{RngBank, StreamRng, StreamSlot},
    types::{AnomalyType, Channel, CustomerId, DeviceType, Label, TransactionId},
};
use chrono::{Duration, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

// ── Constants ────────────────────────────────────────────────────────────────

pub const CURRENCIES: [&str; 4] = ["EUR", "USD", "GBP", "CHF"];
pub const EURO_COUNTRIES: [&str; 4] = ["ES", "FR", "DE", "IT"];
pub const UNUSUAL_COUNTRIES: [&str; 9] = ["RU", "CN", "KP", "IR", "SY", "AF", "YE", "NG", "PK"];
pub const UNUSUAL_HOURS: [u32; 7] = [0, 1, 2, 3, 4, 5, 23];

const LOW_RANGE_PROBABILITY: f64 = 0.70;
const MEDIUM_RANGE_PROBABILITY: f64 = 0.95;
const LOW_RANGE_MULTIPLIER: f64 = 0.3;
const MEDIUM_RANGE_MAX_MULTIPLIER: f64 = 0.8;

pub const MAX_TRANSACTION_AMOUNT: f64 = 100_000.0;
pub const LOW_SPENDER_THRESHOLD: f64 = 5_000.0;
pub const HIGH_AMOUNT_MIN: f64 = 10_000.0;
pub const COMBINED_AMOUNT_MIN: f64 = 15_000.0;

pub const MIN_CUSTOMERS: usize = 100;
pub const TRANSACTIONS_PER_CUSTOMER: usize = 50;
pub const ANOMALY_CUSTOMERS_RATIO: usize = 10;
pub const DAYS_LOOKBACK: i64 = 365;

// ── Records ──────────────────────────────────────────────────────────────────

/// One generated row. Field order is the persisted column order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub transaction_id: TransactionId,
    pub customer_id: CustomerId,
    pub timestamp: NaiveDateTime,
    pub amount: f64,
    pub currency: String,
    pub origin_country: String,
    pub destination_country: String,
    pub channel: Channel,
    pub device_type: DeviceType,
    pub is_anomaly: Label,
    /// Recipe that produced an anomalous row. Not persisted.
    #[serde(skip)]
    pub anomaly_type: Option<AnomalyType>,
}

impl Transaction {
    pub fn hour(&self) -> u32 {
        self.timestamp.hour()
    }
}

/// A generated batch together with the profiles that shaped it.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub transactions: Vec<Transaction>,
    pub profiles: CustomerProfileStore,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn anomaly_count(&self) -> usize {
        self.transactions.iter().filter(|t| t.is_anomaly == 1).count()
    }

    pub fn labels(&self) -> Vec<Label> {
        self.transactions.iter().map(|t| t.is_anomaly).collect()
    }
}

/// Fields shared by both row kinds once amount, hour and destination are fixed.
struct RowDraft {
    customer_id: CustomerId,
    amount: f64,
    hour: u32,
    origin_country: String,
    destination_country: String,
}

// ── Generator ────────────────────────────────────────────────────────────────

pub struct TransactionGenerator {
    config: GeneratorConfig,
    bank: RngBank,
    window_start: NaiveDateTime,
}

impl TransactionGenerator {
    /// Rejects an invalid configuration before any work is done.
    pub fn new(config: GeneratorConfig) -> DetectResult<Self> {
        config.validate()?;
        let window_start = (config.as_of - Duration::days(DAYS_LOOKBACK))
            .and_hms_opt(0, 0, 0)
            .unwrap_or_default();
        Ok(Self {
            bank: RngBank::new(config.seed),
            config,
            window_start,
        })
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Generate, merge, shuffle and number the full batch.
    pub fn generate(&self) -> Dataset {
        let n_anomalies = self.config.n_anomalies();
        let n_normal = self.config.n_normal();
        log::info!(
            "generator: {n_normal} normal + {n_anomalies} anomalous rows (seed={})",
            self.config.seed
        );

        let mut profiles = CustomerProfileStore::new();
        let mut profile_rng = self.bank.for_slot(StreamSlot::Profiles);

        let mut transactions = self.generate_normal(n_normal, &mut profiles, &mut profile_rng);
        transactions.extend(self.generate_anomalies(n_anomalies, &mut profiles, &mut profile_rng));

        let mut shuffle_rng = self.bank.for_slot(StreamSlot::Shuffle);
        shuffle_rng.shuffle(&mut transactions);
        for (i, txn) in transactions.iter_mut().enumerate() {
            txn.transaction_id = format!("TXN{i:08}");
        }

        log::info!(
            "generator: {} rows across {} customer profiles",
            transactions.len(),
            profiles.len()
        );
        Dataset { transactions, profiles }
    }

    fn generate_normal(
        &self,
        n: usize,
        profiles: &mut CustomerProfileStore,
        profile_rng: &mut StreamRng,
    ) -> Vec<Transaction> {
        let pool = customer_pool(MIN_CUSTOMERS.max(n / TRANSACTIONS_PER_CUSTOMER));
        let mut rng = self.bank.for_slot(StreamSlot::NormalRows);
        let mut rows = Vec::with_capacity(n);

        for _ in 0..n {
            let customer_id = rng.choose(&pool).clone();
            let profile = profiles.get_or_create(&customer_id, profile_rng);
            profile.transaction_count += 1;

            let amount = normal_amount(profile, &mut rng);
            let hour = rng.range_inclusive(profile.hour_range.0, profile.hour_range.1);
            let destination_country = rng.choose(&profile.typical_countries).clone();

            let draft = RowDraft {
                customer_id,
                amount,
                hour,
                origin_country: profile.home_country.clone(),
                destination_country,
            };
            rows.push(self.finish_row(draft, None, &mut rng));
        }
        rows
    }

    fn generate_anomalies(
        &self,
        n: usize,
        profiles: &mut CustomerProfileStore,
        profile_rng: &mut StreamRng,
    ) -> Vec<Transaction> {
        // Anomalies concentrate on a smaller pool of customers.
        let pool = customer_pool((MIN_CUSTOMERS / 2).max(n / ANOMALY_CUSTOMERS_RATIO));
        let mut rng = self.bank.for_slot(StreamSlot::AnomalyRows);
        let mut rows = Vec::with_capacity(n);

        for _ in 0..n {
            let customer_id = rng.choose(&pool).clone();
            let profile = profiles.get_or_create(&customer_id, profile_rng);
            let anomaly_type = *rng.choose(&AnomalyType::ALL);

            let draft = anomalous_draft(customer_id, profile, anomaly_type, &mut rng);
            rows.push(self.finish_row(draft, Some(anomaly_type), &mut rng));
        }
        rows
    }

    /// Timestamp, currency, channel and device follow the same rule for
    /// every row kind.
    fn finish_row(
        &self,
        draft: RowDraft,
        anomaly_type: Option<AnomalyType>,
        rng: &mut StreamRng,
    ) -> Transaction {
        let day_offset = rng.range_inclusive(0, DAYS_LOOKBACK as u32);
        let minute = rng.range_inclusive(0, 59);
        let timestamp = self.window_start
            + Duration::days(day_offset as i64)
            + Duration::hours(draft.hour as i64)
            + Duration::minutes(minute as i64);

        let currency = if EURO_COUNTRIES.contains(&draft.origin_country.as_str()) {
            "EUR".to_string()
        } else {
            rng.choose(&CURRENCIES).to_string()
        };
        let channel = *rng.choose(&Channel::ALL);
        let device_type = *rng.choose(&DeviceType::ALL);

        Transaction {
            transaction_id: String::new(),
            customer_id: draft.customer_id,
            timestamp,
            amount: draft.amount,
            currency,
            origin_country: draft.origin_country,
            destination_country: draft.destination_country,
            channel,
            device_type,
            is_anomaly: u8::from(anomaly_type.is_some()),
            anomaly_type,
        }
    }
}

fn customer_pool(size: usize) -> Vec<CustomerId> {
    (0..size).map(|i| format!("CUST{i:06}")).collect()
}

fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Three-segment piecewise-uniform draw over the profile's range:
/// 70% low segment, 25% middle, 5% top.
fn normal_amount(profile: &CustomerProfile, rng: &mut StreamRng) -> f64 {
    let (min, max) = profile.amount_range;
    let span = max - min;
    let roll = rng.next_f64();
    let raw = if roll < LOW_RANGE_PROBABILITY {
        rng.uniform(min, min + span * LOW_RANGE_MULTIPLIER)
    } else if roll < MEDIUM_RANGE_PROBABILITY {
        rng.uniform(min + span * LOW_RANGE_MULTIPLIER, min + span * MEDIUM_RANGE_MAX_MULTIPLIER)
    } else {
        rng.uniform(min + span * MEDIUM_RANGE_MAX_MULTIPLIER, max)
    };
    round_cents(raw).clamp(min, max).min(MAX_TRANSACTION_AMOUNT)
}

/// Apply exactly one rule-violation recipe. Dimensions the recipe does not
/// target stay profile-consistent.
fn anomalous_draft(
    customer_id: CustomerId,
    profile: &CustomerProfile,
    anomaly_type: AnomalyType,
    rng: &mut StreamRng,
) -> RowDraft {
    let typical_max = profile.typical_max();
    let mut hour = rng.range_inclusive(profile.hour_range.0, profile.hour_range.1);
    let mut destination_country = rng.choose(&profile.typical_countries).clone();

    let amount = match anomaly_type {
        AnomalyType::HighAmountUnusualUser => {
            if typical_max < LOW_SPENDER_THRESHOLD {
                rng.uniform(HIGH_AMOUNT_MIN, MAX_TRANSACTION_AMOUNT)
            } else {
                rng.uniform(typical_max * 2.0, MAX_TRANSACTION_AMOUNT)
            }
        }
        AnomalyType::UnusualTime => {
            hour = unusual_hour(profile, rng);
            rng.uniform(typical_max * 0.5, typical_max * 3.0)
        }
        AnomalyType::UnusualCountry => {
            destination_country = rng.choose(&UNUSUAL_COUNTRIES).to_string();
            rng.uniform(typical_max * 0.3, typical_max * 2.0)
        }
        AnomalyType::CombinedAnomaly => {
            hour = unusual_hour(profile, rng);
            destination_country = rng.choose(&UNUSUAL_COUNTRIES).to_string();
            rng.uniform(COMBINED_AMOUNT_MIN, MAX_TRANSACTION_AMOUNT)
        }
    };

    RowDraft {
        customer_id,
        amount: round_cents(amount).min(MAX_TRANSACTION_AMOUNT),
        hour,
        origin_country: profile.home_country.clone(),
        destination_country,
    }
}

/// Night hours outside the profile's window. A window reaching 23:00
/// loses 23 from the candidate set.
fn unusual_hour(profile: &CustomerProfile, rng: &mut StreamRng) -> u32 {
    let candidates: Vec<u32> = UNUSUAL_HOURS
        .iter()
        .copied()
        .filter(|h| !profile.contains_hour(*h))
        .collect();
    if candidates.is_empty() {
        *rng.choose(&UNUSUAL_HOURS[..6])
    } else {
        *rng.choose(&candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::SpendTier;

    fn profile(tier: SpendTier) -> CustomerProfile {
        let t = tier.template();
        CustomerProfile {
            customer_id: "CUST000000".into(),
            spend_tier: tier,
            amount_range: t.amount_range,
            hour_range: t.hour_range,
            home_country: t.countries[0].to_string(),
            typical_countries: t.countries.iter().map(|c| c.to_string()).collect(),
            transaction_count: 0,
        }
    }

    #[test]
    fn normal_amount_respects_range() {
        let mut rng = RngBank::new(5).for_slot(StreamSlot::NormalRows);
        for tier in SpendTier::ALL {
            let p = profile(tier);
            for _ in 0..500 {
                assert!(p.contains_amount(normal_amount(&p, &mut rng)));
            }
        }
    }

    #[test]
    fn normal_amount_is_right_skewed() {
        let mut rng = RngBank::new(5).for_slot(StreamSlot::NormalRows);
        let p = profile(SpendTier::MediumSpender);
        let low_cut = p.amount_range.0 + (p.amount_range.1 - p.amount_range.0) * 0.3;
        let draws = 4000;
        let low = (0..draws)
            .filter(|_| normal_amount(&p, &mut rng) <= low_cut)
            .count();
        let share = low as f64 / draws as f64;
        assert!((0.65..0.75).contains(&share), "low-segment share {share}");
    }

    #[test]
    fn unusual_hour_leaves_high_spender_window() {
        let mut rng = RngBank::new(5).for_slot(StreamSlot::AnomalyRows);
        let p = profile(SpendTier::HighSpender);
        for _ in 0..200 {
            let h = unusual_hour(&p, &mut rng);
            assert!(!p.contains_hour(h), "hour {h} inside 8..=23");
        }
    }

    #[test]
    fn each_recipe_breaks_a_dimension() {
        let mut rng = RngBank::new(5).for_slot(StreamSlot::AnomalyRows);
        for tier in SpendTier::ALL {
            let p = profile(tier);
            for kind in AnomalyType::ALL {
                for _ in 0..50 {
                    let d = anomalous_draft(p.customer_id.clone(), &p, kind, &mut rng);
                    let broken = !p.contains_amount(d.amount)
                        || !p.contains_hour(d.hour)
                        || !p.contains_country(&d.destination_country);
                    assert!(broken, "{} on {} stayed in profile", kind.as_str(), tier.as_str());
                    assert!(d.amount <= MAX_TRANSACTION_AMOUNT);
                }
            }
        }
    }
}
