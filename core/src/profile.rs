//! Customer behavioral profiles and the store that owns them.
//!
//! RULE: Profiles are created lazily by the generator through
//! `CustomerProfileStore::get_or_create` and never deleted.
//! The anomaly engine never sees a profile, only projected features.

use crate::{rng::StreamRng, types::CustomerId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SpendTier {
    LowSpender,
    MediumSpender,
    HighSpender,
    Business,
}

/// Static behavioral template for one spend tier.
#[derive(Debug, Clone, Copy)]
pub struct TierTemplate {
    pub amount_range: (f64, f64),
    pub hour_range: (u32, u32),
    pub countries: &'static [&'static str],
}

impl SpendTier {
    pub const ALL: [SpendTier; 4] = [
        SpendTier::LowSpender,
        SpendTier::MediumSpender,
        SpendTier::HighSpender,
        SpendTier::Business,
    ];

    pub fn template(&self) -> TierTemplate {
        match self {
            Self::LowSpender => TierTemplate {
                amount_range: (10.0, 500.0),
                hour_range: (9, 21),
                countries: &["ES", "FR", "IT"],
            },
            Self::MediumSpender => TierTemplate {
                amount_range: (100.0, 3000.0),
                hour_range: (8, 22),
                countries: &["ES", "FR", "DE", "IT", "GB"],
            },
            Self::HighSpender => TierTemplate {
                amount_range: (1000.0, 15000.0),
                hour_range: (8, 23),
                countries: &["ES", "FR", "DE", "IT", "GB", "US"],
            },
            Self::Business => TierTemplate {
                amount_range: (500.0, 25000.0),
                hour_range: (7, 19),
                countries: &["ES", "FR", "DE", "US", "GB", "CH"],
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LowSpender    => "low_spender",
            Self::MediumSpender => "medium_spender",
            Self::HighSpender   => "high_spender",
            Self::Business      => "business",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomerProfile {
    pub customer_id: CustomerId,
    pub spend_tier: SpendTier,
    pub amount_range: (f64, f64),
    /// Inclusive.
    pub hour_range: (u32, u32),
    pub home_country: String,
    pub typical_countries: Vec<String>,
    pub transaction_count: u64,
}

impl CustomerProfile {
    pub fn typical_max(&self) -> f64 {
        self.amount_range.1
    }

    pub fn contains_amount(&self, amount: f64) -> bool {
        amount >= self.amount_range.0 && amount <= self.amount_range.1
    }

    pub fn contains_hour(&self, hour: u32) -> bool {
        hour >= self.hour_range.0 && hour <= self.hour_range.1
    }

    pub fn contains_country(&self, country: &str) -> bool {
        self.typical_countries.iter().any(|c| c == country)
    }
}

/// Creation policy: a pure function of the random stream.
/// Tier is uniform; home country is uniform over the tier's countries.
pub fn draw_profile(customer_id: &str, rng: &mut StreamRng) -> CustomerProfile {
    let tier = *rng.choose(&SpendTier::ALL);
    let template = tier.template();
    let home_country = rng.choose(template.countries).to_string();

    CustomerProfile {
        customer_id: customer_id.to_string(),
        spend_tier: tier,
        amount_range: template.amount_range,
        hour_range: template.hour_range,
        home_country,
        typical_countries: template.countries.iter().map(|c| c.to_string()).collect(),
        transaction_count: 0,
    }
}

/// Arena of profiles addressed by customer id.
#[derive(Debug, Default, Clone)]
pub struct CustomerProfileStore {
    profiles: Vec<CustomerProfile>,
    index: HashMap<CustomerId, usize>,
}

impl CustomerProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the profile for `customer_id`, creating it from `rng`
    /// on first reference. Existing profiles consume no randomness.
    pub fn get_or_create(&mut self, customer_id: &str, rng: &mut StreamRng) -> &mut CustomerProfile {
        let slot = match self.index.get(customer_id) {
            Some(&slot) => slot,
            None => {
                let slot = self.profiles.len();
                self.profiles.push(draw_profile(customer_id, rng));
                self.index.insert(customer_id.to_string(), slot);
                slot
            }
        };
        &mut self.profiles[slot]
    }

    pub fn get(&self, customer_id: &str) -> Option<&CustomerProfile> {
        self.index.get(customer_id).map(|&slot| &self.profiles[slot])
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Profiles in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &CustomerProfile> {
        self.profiles.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::{RngBank, StreamSlot};

    #[test]
    fn home_country_is_typical() {
        let mut rng = RngBank::new(11).for_slot(StreamSlot::Profiles);
        for i in 0..200 {
            let p = draw_profile(&format!("CUST{i:06}"), &mut rng);
            assert!(p.contains_country(&p.home_country));
            assert_eq!(p.amount_range, p.spend_tier.template().amount_range);
        }
    }

    #[test]
    fn get_or_create_is_lazy_and_stable() {
        let mut rng = RngBank::new(11).for_slot(StreamSlot::Profiles);
        let mut store = CustomerProfileStore::new();

        let first = store.get_or_create("CUST000001", &mut rng).clone();
        store.get_or_create("CUST000001", &mut rng).transaction_count += 1;
        let again = store.get_or_create("CUST000001", &mut rng).clone();

        assert_eq!(store.len(), 1);
        assert_eq!(first.spend_tier, again.spend_tier);
        assert_eq!(first.home_country, again.home_country);
        assert_eq!(again.transaction_count, 1);
        assert!(store.get("CUST000002").is_none());
    }

    #[test]
    fn creation_depends_only_on_stream() {
        let draw = || {
            let mut rng = RngBank::new(99).for_slot(StreamSlot::Profiles);
            (0..20)
                .map(|i| draw_profile(&format!("CUST{i:06}"), &mut rng))
                .collect::<Vec<_>>()
        };
        assert_eq!(draw(), draw());
    }
}
