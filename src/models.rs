use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::replication::BackendOutcome;

/// The four regional database instances holding copies of the report table.
///
/// The enum doubles as the store selector and the fallback-read priority
/// seed. `sud`/`est` keep the original French spelling of the deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Region {
    West,
    Sud,
    Est,
    Centre,
}

impl Region {
    /// Fixed replication order: every write fans out in this sequence.
    pub const ALL: [Region; 4] = [Region::West, Region::Sud, Region::Est, Region::Centre];

    pub fn as_str(self) -> &'static str {
        match self {
            Region::West => "west",
            Region::Sud => "sud",
            Region::Est => "est",
            Region::Centre => "centre",
        }
    }

    /// Read priority when this region is requested: the region itself first,
    /// then the remaining three in the historical fallback rotation.
    pub fn fallback_order(self) -> [Region; 4] {
        match self {
            Region::West => [Region::West, Region::Sud, Region::Est, Region::Centre],
            Region::Sud => [Region::Sud, Region::West, Region::Est, Region::Centre],
            Region::Est => [Region::Est, Region::Sud, Region::West, Region::Centre],
            Region::Centre => [Region::Centre, Region::Sud, Region::Est, Region::West],
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = ();

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "west" => Ok(Region::West),
            "sud" => Ok(Region::Sud),
            "est" => Ok(Region::Est),
            "centre" => Ok(Region::Centre),
            _ => Err(()),
        }
    }
}

/// One incident report row as stored on a regional backend.
///
/// `id` is assigned by each backend independently and is only meaningful on
/// that instance. `global_id` is assigned by the replication coordinator
/// before fan-out and is identical on every backend, so update and delete
/// can target the same logical record everywhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Signalement {
    pub id: i32,
    pub global_id: Uuid,
    pub date: NaiveDate,
    pub localization: Region,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: String,
    pub additionnal_infos: Option<String>,
    pub status: bool,
}

/// A validated mutation payload: every field of a report except the
/// identifiers. This is what the request handlers pass into the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalementDraft {
    pub date: NaiveDate,
    pub localization: Region,
    #[serde(rename = "type")]
    pub kind: String,
    pub additionnal_infos: Option<String>,
    pub status: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSignalementRequest {
    pub id: Uuid,
    #[serde(flatten)]
    pub draft: SignalementDraft,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct ApiMessage {
    pub message: String,
}

/// Write-endpoint envelope: the produced record plus the per-backend
/// replication report, so partial failure is visible to the caller.
#[derive(Debug, Serialize)]
pub struct ReplicatedResponse {
    pub data: Signalement,
    pub replication: Vec<BackendOutcome>,
}

/// Read-endpoint envelope. `served_by` names the region that actually
/// answered; it differs from the requested one when the fallback chain
/// substituted another store.
#[derive(Debug, Serialize)]
pub struct RegionalResponse {
    pub data: Vec<Signalement>,
    pub served_by: Region,
}
