//! Shared primitive types used across the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A stable, opaque customer key (`CUST000042`).
pub type CustomerId = String;

/// A sequential transaction key assigned after shuffling (`TXN00000042`).
pub type TransactionId = String;

/// The canonical run identifier used by the results store.
pub type RunId = String;

/// Ground-truth or predicted label: 0 = normal, 1 = anomalous.
pub type Label = u8;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Web,
    App,
    Atm,
    Branch,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Channel::Web, Channel::App, Channel::Atm, Channel::Branch];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Web    => "web",
            Self::App    => "app",
            Self::Atm    => "atm",
            Self::Branch => "branch",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Desktop,
    Mobile,
    Tablet,
    Atm,
    Pos,
}

impl DeviceType {
    pub const ALL: [DeviceType; 5] = [
        DeviceType::Desktop,
        DeviceType::Mobile,
        DeviceType::Tablet,
        DeviceType::Atm,
        DeviceType::Pos,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Desktop => "desktop",
            Self::Mobile  => "mobile",
            Self::Tablet  => "tablet",
            Self::Atm     => "atm",
            Self::Pos     => "pos",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which rule-violation recipe produced an anomalous row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    HighAmountUnusualUser,
    UnusualTime,
    UnusualCountry,
    CombinedAnomaly,
}

impl AnomalyType {
    pub const ALL: [AnomalyType; 4] = [
        AnomalyType::HighAmountUnusualUser,
        AnomalyType::UnusualTime,
        AnomalyType::UnusualCountry,
        AnomalyType::CombinedAnomaly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HighAmountUnusualUser => "high_amount_unusual_user",
            Self::UnusualTime           => "unusual_time",
            Self::UnusualCountry        => "unusual_country",
            Self::CombinedAnomaly       => "combined_anomaly",
        }
    }
}
