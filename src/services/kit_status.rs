use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QuerySelect, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;

use crate::{
    crypto::DoubleCipher,
    entities::{
        barcode, customer,
        kit_registration::{self, KitStatus},
    },
    errors::ServiceError,
    events::{
        outbox::{self, OutboxMessage},
        Event, EventSender,
    },
    notifications::{templates, EmailMessage},
    services::{
        kit_registrations::{KitSettings, PatientDetails},
        labs::{self, NewLab},
        messages, reference_numbers,
        validation::trim_optional,
    },
};

pub const MAX_REPORT_BYTES: usize = 10 * 1024 * 1024;
pub const REPORT_EXTENSIONS: [&str; 2] = [".pdf", ".xml"];

/// Statuses a kit may move to from `from`.
pub fn allowed_next(from: KitStatus) -> &'static [KitStatus] {
    match from {
        KitStatus::NotReceived => &[KitStatus::Received, KitStatus::Reject, KitStatus::Send],
        KitStatus::Received => &[KitStatus::Send, KitStatus::Reject],
        KitStatus::Reject | KitStatus::Send => &[],
    }
}

pub fn can_transition(from: KitStatus, to: KitStatus) -> bool {
    allowed_next(from).contains(&to)
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct KitStatusRequest {
    pub status: String,
    pub reason: Option<String>,
    /// `new` or `old`; required when sending to a lab.
    #[serde(rename = "type")]
    pub lab_type: Option<String>,
    pub lab_id: Option<i32>,
    pub lab_name: Option<String>,
    pub lab_address: Option<String>,
    pub nhi_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LabChoice {
    Existing(i32),
    New(NewLab),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct StatusChange {
    status: KitStatus,
    reason: Option<String>,
    lab: Option<LabChoice>,
}

impl KitStatusRequest {
    fn parse(&self) -> Result<StatusChange, ServiceError> {
        let invalid = |m: &str| ServiceError::ValidationError(m.to_string());

        let status = KitStatus::from_str(self.status.trim())
            .map_err(|_| invalid(messages::INVALID_KIT_STATUS))?;
        let reason = trim_optional(self.reason.clone());
        if status == KitStatus::Reject && reason.is_none() {
            return Err(invalid(messages::REASON_REQUIRED));
        }

        let lab = if status == KitStatus::Send {
            let lab_type = self.lab_type.as_deref().map(|t| t.trim().to_lowercase());
            match lab_type.as_deref() {
                Some("old") => Some(LabChoice::Existing(
                    self.lab_id.ok_or_else(|| invalid(messages::LAB_ID_REQUIRED))?,
                )),
                Some("new") => Some(LabChoice::New(NewLab::parse(
                    self.lab_name.as_deref(),
                    self.lab_address.as_deref(),
                    self.nhi_number.as_deref(),
                )?)),
                _ => return Err(invalid(messages::INVALID_LAB_TYPE)),
            }
        } else {
            None
        };

        Ok(StatusChange {
            status,
            reason,
            lab,
        })
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct KitStatusChange {
    pub id: i32,
    pub old_status: KitStatus,
    pub kit_status: KitStatus,
    pub reason: Option<String>,
    pub lab_id: Option<i32>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReportUpload {
    pub file_name: String,
    pub file_url: String,
}

/// Extension of an allowed report file, lowercased with its dot.
pub fn report_extension(file_name: &str) -> Result<&'static str, ServiceError> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default();
    REPORT_EXTENSIONS
        .iter()
        .copied()
        .find(|allowed| *allowed == ext)
        .ok_or_else(|| ServiceError::ValidationError(messages::REPORT_FILE_TYPE.to_string()))
}

struct KitContext {
    registration: kit_registration::Model,
    patient: PatientDetails,
    barcode_number: String,
    customer: Option<customer::Model>,
}

#[derive(Clone)]
pub struct KitStatusService {
    db: Arc<DatabaseConnection>,
    cipher: DoubleCipher,
    settings: KitSettings,
    event_sender: Option<Arc<EventSender>>,
}

impl KitStatusService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        cipher: DoubleCipher,
        settings: KitSettings,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db,
            cipher,
            settings,
            event_sender,
        }
    }

    async fn load(&self, txn: &DatabaseTransaction, id: i32) -> Result<KitContext, ServiceError> {
        let registration = kit_registration::Entity::find_by_id(id)
            .lock_exclusive()
            .one(txn)
            .await?
            .filter(|r| !r.is_deleted)
            .ok_or_else(|| ServiceError::NotFound(messages::PATIENT_NOT_FOUND.to_string()))?;
        let patient = PatientDetails::decrypt(&self.cipher, &registration)?;
        let barcode_number = barcode::Entity::find_by_id(registration.barcode_id)
            .one(txn)
            .await?
            .map(|b| b.barcode_number)
            .unwrap_or_default();
        let customer = customer::Entity::find_by_id(registration.customer_id)
            .one(txn)
            .await?;
        Ok(KitContext {
            registration,
            patient,
            barcode_number,
            customer,
        })
    }

    /// Moves a kit through its lab lifecycle and queues the status emails.
    #[instrument(skip(self, request), fields(registration_id = id, status = %request.status))]
    pub async fn update_status(
        &self,
        id: i32,
        request: &KitStatusRequest,
    ) -> Result<KitStatusChange, ServiceError> {
        let change = request.parse()?;

        let txn = self.db.begin().await.map_err(|e| {
            error!("Failed to begin transaction: {}", e);
            ServiceError::DatabaseError(e)
        })?;

        let ctx = self.load(&txn, id).await?;
        let current = ctx.registration.kit_status;
        if current == change.status {
            return Err(ServiceError::Conflict(
                messages::KIT_STATUS_UNCHANGED.to_string(),
            ));
        }
        if !can_transition(current, change.status) {
            return Err(ServiceError::BadRequest(messages::transition_not_allowed(
                &current.to_string(),
                &change.status.to_string(),
            )));
        }

        let lab_id = match &change.lab {
            Some(LabChoice::Existing(lab_id)) => Some(labs::find_lab(&txn, *lab_id).await?.id),
            Some(LabChoice::New(new_lab)) => Some(labs::find_or_create(&txn, new_lab).await?.id),
            None => ctx.registration.lab_id,
        };

        let is_clinic_inform = ctx.registration.is_clinic_inform;
        let mut active: kit_registration::ActiveModel = ctx.registration.clone().into();
        active.kit_status = Set(change.status);
        active.reason = Set(change.reason.clone());
        active.lab_id = Set(lab_id);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        let status = change.status.to_string();
        let mut recipients: Vec<(String, String)> = Vec::new();
        if let Some(admin) = &self.settings.client_email {
            recipients.push((admin.clone(), "Admin".to_string()));
        }
        if is_clinic_inform {
            if let Some(customer) = &ctx.customer {
                recipients.push((customer.email.clone(), customer.full_name()));
            }
        }
        recipients.push((ctx.patient.email.clone(), ctx.patient.full_name()));
        for (to, name) in recipients {
            let html = templates::kit_status_update(
                &name,
                &ctx.barcode_number,
                &status,
                change.reason.as_deref(),
            );
            let key = format!("kit:{}:status:{}:{}", id, status, to);
            outbox::enqueue(
                &txn,
                OutboxMessage::email(key, &EmailMessage::new(to, "Kit Status Update", html))?,
            )
            .await?;
        }

        txn.commit().await.map_err(|e| {
            error!("Failed to commit kit status {}: {}", id, e);
            ServiceError::DatabaseError(e)
        })?;

        info!(registration_id = id, from = %current, to = %change.status, "kit status updated");
        if let Some(sender) = &self.event_sender {
            sender
                .publish(Event::KitStatusChanged {
                    registration_id: id,
                    old_status: current.to_string(),
                    new_status: status,
                })
                .await;
        }

        Ok(KitStatusChange {
            id,
            old_status: current,
            kit_status: updated.kit_status,
            reason: updated.reason,
            lab_id: updated.lab_id,
        })
    }

    /// Stores a lab report for a kit that has been sent to the lab,
    /// replacing any earlier report.
    #[instrument(skip(self, bytes), fields(registration_id = id, size = bytes.len()))]
    pub async fn upload_report(
        &self,
        id: i32,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<ReportUpload, ServiceError> {
        let extension = report_extension(original_name)?;
        if bytes.len() > MAX_REPORT_BYTES {
            return Err(ServiceError::ValidationError(
                messages::REPORT_TOO_LARGE.to_string(),
            ));
        }

        let txn = self.db.begin().await.map_err(|e| {
            error!("Failed to begin transaction: {}", e);
            ServiceError::DatabaseError(e)
        })?;
        let ctx = self.load(&txn, id).await?;
        if ctx.registration.kit_status != KitStatus::Send {
            return Err(ServiceError::BadRequest(
                messages::REPORT_REQUIRES_SEND.to_string(),
            ));
        }

        let dir = self.settings.files_dir.as_path();
        tokio::fs::create_dir_all(dir).await.map_err(|e| {
            error!("Failed to create upload dir {}: {}", dir.display(), e);
            ServiceError::InternalError("Failed to store report".to_string())
        })?;
        let file_name = reference_numbers::allocate_file_name(dir, extension).await?;
        let path = dir.join(&file_name);
        tokio::fs::write(&path, bytes).await.map_err(|e| {
            error!("Failed to write report {}: {}", path.display(), e);
            ServiceError::InternalError("Failed to store report".to_string())
        })?;

        match self.record_report(txn, &ctx, &file_name).await {
            Ok(()) => {}
            Err(e) => {
                if let Err(io) = tokio::fs::remove_file(&path).await {
                    warn!("Failed to remove orphaned report {}: {}", path.display(), io);
                }
                return Err(e);
            }
        }

        if let Some(previous) = ctx.registration.file_path.as_deref() {
            let old = dir.join(previous);
            match tokio::fs::remove_file(&old).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove replaced report {}: {}", old.display(), e),
            }
        }

        info!(registration_id = id, %file_name, "report uploaded");
        if let Some(sender) = &self.event_sender {
            sender
                .publish(Event::ReportUploaded {
                    registration_id: id,
                    file_name: file_name.clone(),
                })
                .await;
        }

        Ok(ReportUpload {
            file_url: self.settings.file_url(&file_name),
            file_name,
        })
    }

    async fn record_report(
        &self,
        txn: DatabaseTransaction,
        ctx: &KitContext,
        file_name: &str,
    ) -> Result<(), ServiceError> {
        let id = ctx.registration.id;
        let mut active: kit_registration::ActiveModel = ctx.registration.clone().into();
        active.file_path = Set(Some(file_name.to_string()));
        active.updated_at = Set(Utc::now());
        active.update(&txn).await?;

        let link = self.settings.file_url(file_name);
        let patient_name = ctx.patient.full_name();
        let mut recipients: Vec<(String, String)> = Vec::new();
        if ctx.registration.is_clinic_inform {
            if let Some(customer) = &ctx.customer {
                recipients.push((customer.email.clone(), customer.full_name()));
            }
        }
        recipients.push((ctx.patient.email.clone(), patient_name.clone()));
        for (to, name) in recipients {
            let html = templates::lab_report(&name, &patient_name, &ctx.barcode_number, &link);
            let key = format!("kit:{}:report:{}:{}", id, file_name, to);
            outbox::enqueue(
                &txn,
                OutboxMessage::email(key, &EmailMessage::new(to, "Theranostics Lab Report", html))?,
            )
            .await?;
        }

        txn.commit().await.map_err(|e| {
            error!("Failed to commit report for {}: {}", id, e);
            ServiceError::DatabaseError(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::tests::cipher;
    use crate::db::tests::memory_db;
    use crate::entities::outbox_event;
    use crate::services::kit_registrations::tests::{registered_kit, settings};
    use rstest::rstest;
    use sea_orm::{ColumnTrait, PaginatorTrait, QueryFilter};

    use KitStatus::{NotReceived, Received, Reject};
    const SEND: KitStatus = KitStatus::Send;

    #[rstest]
    #[case(NotReceived, Received, true)]
    #[case(NotReceived, Reject, true)]
    #[case(NotReceived, SEND, true)]
    #[case(Received, SEND, true)]
    #[case(Received, Reject, true)]
    #[case(Received, NotReceived, false)]
    #[case(Reject, Received, false)]
    #[case(Reject, SEND, false)]
    #[case(SEND, Received, false)]
    #[case(SEND, Reject, false)]
    #[case(SEND, NotReceived, false)]
    fn transition_table(#[case] from: KitStatus, #[case] to: KitStatus, #[case] allowed: bool) {
        assert_eq!(can_transition(from, to), allowed);
    }

    #[rstest]
    #[case("report.PDF", Ok(".pdf"))]
    #[case("data.xml", Ok(".xml"))]
    #[case("photo.png", Err(()))]
    #[case("noext", Err(()))]
    fn report_extensions(#[case] name: &str, #[case] expected: Result<&str, ()>) {
        assert_eq!(report_extension(name).map_err(|_| ()), expected);
    }

    fn request(status: &str) -> KitStatusRequest {
        KitStatusRequest {
            status: status.into(),
            ..Default::default()
        }
    }

    async fn setup(clinic_inform: bool) -> (Arc<DatabaseConnection>, KitStatusService, i32, tempfile::TempDir) {
        let db = Arc::new(memory_db().await);
        let id = registered_kit(&db, 900, clinic_inform).await;
        let dir = tempfile::tempdir().unwrap();
        let service = KitStatusService::new(db.clone(), cipher(), settings(dir.path().to_path_buf()), None);
        (db, service, id, dir)
    }

    async fn emails_with_subject(db: &DatabaseConnection, subject: &str) -> usize {
        outbox_event::Entity::find()
            .filter(outbox_event::Column::EventType.eq(outbox::EVENT_EMAIL))
            .all(db)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.payload["subject"] == subject)
            .count()
    }

    #[tokio::test]
    async fn reject_needs_reason_and_is_terminal() {
        let (db, service, id, _dir) = setup(false).await;

        assert!(matches!(
            service.update_status(id, &request("reject")).await,
            Err(ServiceError::ValidationError(m)) if m == messages::REASON_REQUIRED
        ));

        let rejected = service
            .update_status(
                id,
                &KitStatusRequest {
                    reason: Some("damaged".into()),
                    ..request("REJECT")
                },
            )
            .await
            .unwrap();
        assert_eq!(rejected.kit_status, Reject);
        assert_eq!(rejected.reason.as_deref(), Some("damaged"));
        // admin and patient; the customer opted out
        assert_eq!(emails_with_subject(&db, "Kit Status Update").await, 2);

        assert!(matches!(
            service.update_status(id, &request("received")).await,
            Err(ServiceError::BadRequest(m)) if m == "Transition from Reject to Received is not allowed"
        ));
    }

    #[tokio::test]
    async fn same_status_is_a_conflict() {
        let (_db, service, id, _dir) = setup(false).await;
        service.update_status(id, &request("received")).await.unwrap();
        assert!(matches!(
            service.update_status(id, &request("Received")).await,
            Err(ServiceError::Conflict(_))
        ));
        assert!(matches!(
            service.update_status(id, &request("lost")).await,
            Err(ServiceError::ValidationError(m)) if m == messages::INVALID_KIT_STATUS
        ));
    }

    #[tokio::test]
    async fn send_requires_a_lab() {
        let (db, service, id, _dir) = setup(true).await;

        assert!(matches!(
            service.update_status(id, &request("send")).await,
            Err(ServiceError::ValidationError(m)) if m == messages::INVALID_LAB_TYPE
        ));
        assert!(matches!(
            service
                .update_status(id, &KitStatusRequest { lab_type: Some("old".into()), ..request("send") })
                .await,
            Err(ServiceError::ValidationError(m)) if m == messages::LAB_ID_REQUIRED
        ));
        assert!(matches!(
            service
                .update_status(
                    id,
                    &KitStatusRequest { lab_type: Some("old".into()), lab_id: Some(77), ..request("send") }
                )
                .await,
            Err(ServiceError::NotFound(m)) if m == messages::LAB_NOT_FOUND
        ));

        let sent = service
            .update_status(
                id,
                &KitStatusRequest {
                    lab_type: Some("new".into()),
                    lab_name: Some("Central Lab".into()),
                    lab_address: Some("1 Queen Street".into()),
                    nhi_number: Some("ABC-1234".into()),
                    ..request("send")
                },
            )
            .await
            .unwrap();
        assert_eq!(sent.kit_status, SEND);
        assert!(sent.lab_id.is_some());
        // admin, customer and patient
        assert_eq!(emails_with_subject(&db, "Kit Status Update").await, 3);
    }

    #[tokio::test]
    async fn report_upload_replaces_previous_file() {
        let (db, service, id, dir) = setup(true).await;

        assert!(matches!(
            service.upload_report(id, "r.pdf", b"%PDF").await,
            Err(ServiceError::BadRequest(m)) if m == messages::REPORT_REQUIRES_SEND
        ));
        assert!(matches!(
            service.upload_report(id, "r.exe", b"MZ").await,
            Err(ServiceError::ValidationError(m)) if m == messages::REPORT_FILE_TYPE
        ));
        let too_big = vec![0u8; MAX_REPORT_BYTES + 1];
        assert!(matches!(
            service.upload_report(id, "r.pdf", &too_big).await,
            Err(ServiceError::ValidationError(m)) if m == messages::REPORT_TOO_LARGE
        ));

        service
            .update_status(
                id,
                &KitStatusRequest {
                    lab_type: Some("new".into()),
                    lab_name: Some("Central Lab".into()),
                    lab_address: Some("1 Queen Street".into()),
                    nhi_number: Some("ABC-1234".into()),
                    ..request("send")
                },
            )
            .await
            .unwrap();

        let first = service.upload_report(id, "r.pdf", b"%PDF-1").await.unwrap();
        assert!(first.file_url.ends_with(&first.file_name));
        assert!(dir.path().join(&first.file_name).exists());

        let second = service.upload_report(id, "r.XML", b"<r/>").await.unwrap();
        assert!(second.file_name.ends_with(".xml"));
        assert!(!dir.path().join(&first.file_name).exists());
        assert!(dir.path().join(&second.file_name).exists());

        let row = kit_registration::Entity::find_by_id(id).one(&*db).await.unwrap().unwrap();
        assert_eq!(row.file_path.as_deref(), Some(second.file_name.as_str()));
        assert_eq!(emails_with_subject(&db, "Theranostics Lab Report").await, 4);
        let pending = outbox_event::Entity::find()
            .filter(outbox_event::Column::Status.eq(outbox_event::STATUS_PENDING))
            .count(&*db)
            .await
            .unwrap();
        assert!(pending >= 4);
    }
}
