use uuid::Uuid;

/// Alert rule identifier.
pub type RuleId = Uuid;

/// Patient identifier (the metrics pipeline keys snapshots by this).
pub type PatientId = Uuid;

/// Clinician / rule owner identifier.
pub type UserId = Uuid;

/// Alert instance identifier.
pub type AlertId = Uuid;

/// Delivery record identifier.
pub type DeliveryId = Uuid;
