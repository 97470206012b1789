use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::distance::{round_km, Coordinate};
use crate::errors::{AppError, AppResult};
use crate::geocoder::ResolutionOutcome;
use crate::resolver::AddressResolver;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Address {
    pub line1: String,
    pub line2: String,
}

impl Address {
    pub fn new(line1: impl Into<String>, line2: impl Into<String>) -> Self {
        Self {
            line1: line1.into(),
            line2: line2.into(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.line1.trim().is_empty() && self.line2.trim().is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Record {
    pub merchant: Address,
    pub home: Address,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Classification {
    WithinThreshold,
    ExceedsThreshold,
}

impl Classification {
    pub fn classify(distance_km: f64, threshold_km: f64) -> Self {
        if distance_km <= threshold_km {
            Classification::WithinThreshold
        } else {
            Classification::ExceedsThreshold
        }
    }

    pub fn label(&self, threshold_km: f64) -> String {
        match self {
            Classification::WithinThreshold => format!("{threshold_km}km 이내"),
            Classification::ExceedsThreshold => format!("{threshold_km}km 초과"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FailureReason {
    MerchantAddressEmpty,
    HomeAddressEmpty,
    HomeAddressNotFound,
    MerchantAddressNotFound,
    ComputationError(String),
}

impl FailureReason {
    pub fn label(&self) -> String {
        match self {
            FailureReason::MerchantAddressEmpty => "가맹점주소 비어있음".to_string(),
            FailureReason::HomeAddressEmpty => "자택주소 비어있음".to_string(),
            FailureReason::HomeAddressNotFound => "자택주소 검색결과 없음".to_string(),
            FailureReason::MerchantAddressNotFound => "가맹점주소 검색결과 없음".to_string(),
            FailureReason::ComputationError(details) => format!("계산 중 오류: {details}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RecordOutcome {
    Distance {
        km: f64,
        classification: Classification,
    },
    Failure(FailureReason),
}

impl RecordOutcome {
    pub fn distance_km(&self) -> Option<f64> {
        match self {
            RecordOutcome::Distance { km, .. } => Some(*km),
            RecordOutcome::Failure(_) => None,
        }
    }

    pub fn label(&self, threshold_km: f64) -> String {
        match self {
            RecordOutcome::Distance { classification, .. } => classification.label(threshold_km),
            RecordOutcome::Failure(reason) => reason.label(),
        }
    }
}

pub struct RecordAnnotator {
    resolver: Arc<AddressResolver>,
    threshold_km: f64,
}

impl RecordAnnotator {
    pub fn new(resolver: Arc<AddressResolver>, threshold_km: f64) -> Self {
        Self {
            resolver,
            threshold_km,
        }
    }

    pub fn resolver(&self) -> &Arc<AddressResolver> {
        &self.resolver
    }

    pub fn threshold_km(&self) -> f64 {
        self.threshold_km
    }

    pub async fn annotate(&self, record: &Record) -> RecordOutcome {
        if record.merchant.is_blank() {
            return RecordOutcome::Failure(FailureReason::MerchantAddressEmpty);
        }
        if record.home.is_blank() {
            return RecordOutcome::Failure(FailureReason::HomeAddressEmpty);
        }

        match self.measure(record).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(error = %err, ?record, "distance computation failed");
                RecordOutcome::Failure(FailureReason::ComputationError(err.to_string()))
            }
        }
    }

    async fn measure(&self, record: &Record) -> AppResult<RecordOutcome> {
        let Some(home) = self.locate(&record.home).await? else {
            return Ok(RecordOutcome::Failure(FailureReason::HomeAddressNotFound));
        };
        let Some(merchant) = self.locate(&record.merchant).await? else {
            return Ok(RecordOutcome::Failure(
                FailureReason::MerchantAddressNotFound,
            ));
        };

        let km = merchant.distance_km(&home);
        if !km.is_finite() {
            return Err(AppError::Parse(format!(
                "non-finite distance between {merchant:?} and {home:?}"
            )));
        }
        let classification = Classification::classify(km, self.threshold_km);
        debug!(km, ?classification, "distance computed");

        Ok(RecordOutcome::Distance {
            km: round_km(km),
            classification,
        })
    }

    async fn locate(&self, address: &Address) -> AppResult<Option<Coordinate>> {
        let outcome = self
            .resolver
            .resolve(&address.line1, &address.line2)
            .await?;
        Ok(match outcome {
            ResolutionOutcome::Resolved(coordinate) => Some(coordinate),
            ResolutionOutcome::NotFound => None,
        })
    }
}
