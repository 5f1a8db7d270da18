use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, ConnectionTrait,
    DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    crypto::DoubleCipher,
    db::conflict_on_unique,
    entities::{
        barcode,
        customer::{self, CustomerType},
        kit_registration::{self, KitStatus},
        lab,
        order::{self, OrderStatus},
    },
    errors::{validate_in_order, FieldOrder, ServiceError},
    events::{
        outbox::{self, OutboxMessage},
        Event, EventSender,
    },
    notifications::{templates, EmailMessage},
    services::{
        barcodes::validate_barcode,
        messages,
        orders::LabSummary,
        validation::{trim_optional, EMAIL_RE, NAME_RE},
    },
};

pub const GENDERS: [&str; 3] = ["male", "female", "other"];
pub const MIN_AGE: i32 = 18;
pub const MAX_AGE: i32 = 150;

/// Deployment settings shared by the kit registration services.
#[derive(Debug, Clone)]
pub struct KitSettings {
    /// Admin inbox copied on registrations and status changes.
    pub client_email: Option<String>,
    pub files_dir: PathBuf,
    pub api_url: String,
}

impl KitSettings {
    pub fn file_url(&self, file_name: &str) -> String {
        format!("{}/files/{}", self.api_url.trim_end_matches('/'), file_name)
    }
}

/// Decrypted patient fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct PatientDetails {
    pub first_name: String,
    pub last_name: Option<String>,
    pub email: String,
    pub gender: String,
    pub age: i32,
}

impl PatientDetails {
    pub fn decrypt(cipher: &DoubleCipher, row: &kit_registration::Model) -> Result<Self, ServiceError> {
        let age = cipher.decrypt(&row.age)?;
        Ok(Self {
            first_name: cipher.decrypt(&row.first_name)?,
            last_name: cipher.decrypt_optional(row.last_name.as_deref())?,
            email: cipher.decrypt(&row.email)?,
            gender: cipher.decrypt(&row.gender)?,
            age: age.parse().map_err(|_| {
                ServiceError::EncryptionError(format!("stored age is not a number for registration {}", row.id))
            })?,
        })
    }

    pub fn full_name(&self) -> String {
        match &self.last_name {
            Some(last) => format!("{} {}", self.first_name, last),
            None => self.first_name.clone(),
        }
    }
}

/// A registration with its patient fields decrypted.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RegistrationDetails {
    pub id: i32,
    pub patient: PatientDetails,
    pub is_clinic_inform: bool,
    pub kit_status: KitStatus,
    pub reason: Option<String>,
    pub file_path: Option<String>,
    pub lab: Option<LabSummary>,
    pub created_at: DateTime<Utc>,
}

impl RegistrationDetails {
    pub fn decrypt(
        cipher: &DoubleCipher,
        row: kit_registration::Model,
        lab: Option<LabSummary>,
    ) -> Result<Self, ServiceError> {
        Ok(Self {
            patient: PatientDetails::decrypt(cipher, &row)?,
            id: row.id,
            is_clinic_inform: row.is_clinic_inform,
            kit_status: row.kit_status,
            reason: row.reason,
            file_path: row.file_path,
            lab,
            created_at: row.created_at,
        })
    }
}

/// Patient payload, sent double-encrypted by the registration form.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PatientPayload {
    #[validate(
        length(min = 3, max = 50, message = "First name must be between 3 and 50 characters"),
        regex(path = "NAME_RE", message = "First name must contain only letters and single spaces")
    )]
    pub first_name: String,
    #[validate(
        length(min = 3, max = 50, message = "Last name must be between 3 and 50 characters"),
        regex(path = "NAME_RE", message = "Last name must contain only letters and single spaces")
    )]
    pub last_name: Option<String>,
    #[validate(
        length(max = 255, message = "Email cannot exceed 255 characters"),
        regex(path = "EMAIL_RE", message = "Invalid email format")
    )]
    pub email: String,
    pub gender: String,
    pub age: i32,
    pub order_id: i32,
    pub customer_id: i32,
    pub barcode_number: String,
    #[serde(default)]
    pub is_clinic_inform: bool,
}

impl FieldOrder for PatientPayload {
    const FIELD_ORDER: &'static [&'static str] = &["first_name", "last_name", "email"];
}

impl PatientPayload {
    fn checked(self) -> Result<Self, ServiceError> {
        let payload = Self {
            first_name: self.first_name.trim().to_string(),
            last_name: trim_optional(self.last_name),
            email: self.email.trim().to_string(),
            gender: self.gender.trim().to_lowercase(),
            barcode_number: self.barcode_number.trim().to_string(),
            ..self
        };
        validate_in_order(&payload)?;
        if !GENDERS.contains(&payload.gender.as_str()) {
            return Err(ServiceError::ValidationError(messages::INVALID_GENDER.to_string()));
        }
        if payload.age < MIN_AGE {
            return Err(ServiceError::ValidationError(messages::AGE_TOO_LOW.to_string()));
        }
        if payload.age > MAX_AGE {
            return Err(ServiceError::ValidationError(messages::AGE_TOO_HIGH.to_string()));
        }
        validate_barcode(&payload.barcode_number)?;
        Ok(payload)
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VerifiedBarcode {
    pub barcode_id: i32,
    pub barcode_number: String,
    pub order_id: i32,
    pub order_number: String,
    pub product_name: String,
    pub customer_id: i32,
    pub customer_first_name: String,
    pub customer_last_name: Option<String>,
    pub customer_email: String,
    pub customer_type: CustomerType,
    pub clinic_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RegistrationListItem {
    #[serde(flatten)]
    pub details: RegistrationDetails,
    pub barcode_number: String,
    pub order_id: i32,
    pub order_number: String,
    pub customer_name: String,
    pub customer_email: String,
    pub file_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrationFilter {
    pub status: Option<String>,
    pub search: Option<String>,
}

/// The barcode, its dispatched order and the ordering customer.
pub(crate) async fn dispatched_kit<C: ConnectionTrait>(
    conn: &C,
    barcode_number: &str,
) -> Result<(barcode::Model, order::Model, customer::Model), ServiceError> {
    let not_found = || ServiceError::NotFound(messages::BARCODE_NOT_FOUND.to_string());

    let barcode = barcode::Entity::find()
        .filter(barcode::Column::BarcodeNumber.eq(barcode_number))
        .filter(barcode::Column::IsDeleted.eq(false))
        .one(conn)
        .await?
        .ok_or_else(not_found)?;
    let order = order::Entity::find_by_id(barcode.order_id)
        .filter(order::Column::OrderStatus.eq(OrderStatus::Dispatched))
        .filter(order::Column::IsDeleted.eq(false))
        .one(conn)
        .await?
        .ok_or_else(not_found)?;
    let customer = customer::Entity::find_by_id(order.customer_id)
        .filter(customer::Column::IsDeleted.eq(false))
        .one(conn)
        .await?
        .ok_or_else(not_found)?;
    Ok((barcode, order, customer))
}

async fn ensure_unregistered<C: ConnectionTrait>(
    conn: &C,
    barcode_id: i32,
    order_id: i32,
    customer_id: i32,
) -> Result<(), ServiceError> {
    let existing = kit_registration::Entity::find()
        .filter(kit_registration::Column::BarcodeId.eq(barcode_id))
        .filter(kit_registration::Column::OrderId.eq(order_id))
        .filter(kit_registration::Column::CustomerId.eq(customer_id))
        .filter(kit_registration::Column::IsDeleted.eq(false))
        .count(conn)
        .await?;
    if existing > 0 {
        return Err(ServiceError::Conflict(
            messages::KIT_ALREADY_REGISTERED.to_string(),
        ));
    }
    Ok(())
}

#[derive(Clone)]
pub struct KitRegistrationService {
    db: Arc<DatabaseConnection>,
    cipher: DoubleCipher,
    settings: KitSettings,
    event_sender: Option<Arc<EventSender>>,
}

impl KitRegistrationService {
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

    /// Checks that a barcode belongs to a dispatched order and has not been
    /// registered, returning what the registration form shows.
    #[instrument(skip(self))]
    pub async fn verify(&self, barcode_number: &str) -> Result<VerifiedBarcode, ServiceError> {
        let barcode_number = barcode_number.trim();
        validate_barcode(barcode_number)?;

        let (barcode, order, customer) = dispatched_kit(&*self.db, barcode_number).await?;
        ensure_unregistered(&*self.db, barcode.id, order.id, customer.id).await?;

        Ok(VerifiedBarcode {
            barcode_id: barcode.id,
            barcode_number: barcode.barcode_number,
            order_id: order.id,
            order_number: order.order_number,
            product_name: order.product_name,
            customer_id: customer.id,
            customer_first_name: customer.first_name,
            customer_last_name: customer.last_name,
            customer_email: customer.email,
            customer_type: customer.customer_type,
            clinic_id: customer.clinic_id,
        })
    }

    /// Registers a kit from the encrypted patient payload.
    #[instrument(skip(self, patient_data))]
    pub async fn register(&self, patient_data: &str) -> Result<i32, ServiceError> {
        let invalid = || ServiceError::BadRequest(messages::PATIENT_DATA_INVALID.to_string());
        let decrypted = self.cipher.decrypt(patient_data.trim()).map_err(|e| {
            warn!("patient payload could not be decrypted: {}", e);
            invalid()
        })?;
        let payload: PatientPayload = serde_json::from_str(&decrypted).map_err(|e| {
            warn!("patient payload is not valid JSON: {}", e);
            invalid()
        })?;
        let payload = payload.checked()?;

        let txn = self.db.begin().await.map_err(|e| {
            error!("Failed to begin transaction: {}", e);
            ServiceError::DatabaseError(e)
        })?;

        let (barcode, order, customer) = dispatched_kit(&txn, &payload.barcode_number).await?;
        if order.id != payload.order_id || customer.id != payload.customer_id {
            return Err(ServiceError::BadRequest(
                messages::PATIENT_RECORD_MISMATCH.to_string(),
            ));
        }
        ensure_unregistered(&txn, barcode.id, order.id, customer.id).await?;

        let now = Utc::now();
        let registration = kit_registration::ActiveModel {
            barcode_id: Set(barcode.id),
            order_id: Set(order.id),
            customer_id: Set(customer.id),
            lab_id: Set(None),
            first_name: Set(self.cipher.encrypt(&payload.first_name)?),
            last_name: Set(self.cipher.encrypt_optional(payload.last_name.as_deref())?),
            email: Set(self.cipher.encrypt(&payload.email)?),
            gender: Set(self.cipher.encrypt(&payload.gender)?),
            age: Set(self.cipher.encrypt(&payload.age.to_string())?),
            is_clinic_inform: Set(payload.is_clinic_inform),
            kit_status: Set(KitStatus::NotReceived),
            reason: Set(None),
            file_path: Set(None),
            is_deleted: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| conflict_on_unique(e, messages::KIT_ALREADY_REGISTERED))?;

        let patient_name = match &payload.last_name {
            Some(last) => format!("{} {}", payload.first_name, last),
            None => payload.first_name.clone(),
        };
        let mut emails = Vec::new();
        if let Some(admin) = &self.settings.client_email {
            emails.push(EmailMessage::new(
                admin.clone(),
                "New Kit Registration",
                templates::new_kit_registration_admin(
                    &patient_name,
                    &barcode.barcode_number,
                    &order.order_number,
                    &customer.full_name(),
                ),
            ));
        }
        if payload.is_clinic_inform {
            emails.push(EmailMessage::new(
                customer.email.clone(),
                "Kit Registration Confirmation",
                templates::kit_registration_confirmation(
                    &customer.full_name(),
                    &patient_name,
                    &barcode.barcode_number,
                ),
            ));
        }
        emails.push(EmailMessage::new(
            payload.email.clone(),
            "Kit Registration Confirmation",
            templates::kit_registration_confirmation(
                &patient_name,
                &patient_name,
                &barcode.barcode_number,
            ),
        ));
        for (n, email) in emails.iter().enumerate() {
            let key = format!("kit:{}:registered:{}", registration.id, n);
            outbox::enqueue(&txn, OutboxMessage::email(key, email)?).await?;
        }

        txn.commit().await.map_err(|e| {
            error!("Failed to commit kit registration: {}", e);
            ServiceError::DatabaseError(e)
        })?;

        info!(
            registration_id = registration.id,
            barcode_id = barcode.id,
            order_id = order.id,
            "kit registered"
        );
        if let Some(sender) = &self.event_sender {
            sender
                .publish(Event::KitRegistered {
                    registration_id: registration.id,
                    barcode_id: barcode.id,
                })
                .await;
        }
        Ok(registration.id)
    }

    /// Registrations newest first, with patient fields decrypted.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        page: u64,
        per_page: u64,
        filter: RegistrationFilter,
    ) -> Result<(Vec<RegistrationListItem>, u64), ServiceError> {
        let db = &*self.db;
        let mut query =
            kit_registration::Entity::find().filter(kit_registration::Column::IsDeleted.eq(false));

        if let Some(status) = filter.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let status = KitStatus::from_str(status)
                .map_err(|_| ServiceError::ValidationError(messages::INVALID_KIT_STATUS.to_string()))?;
            query = query.filter(kit_registration::Column::KitStatus.eq(status));
        }
        if let Some(term) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            // Patient fields are encrypted, so search covers the plaintext
            // barcode, order and customer columns.
            let pattern = format!("%{}%", term);
            let barcode_ids: Vec<i32> = barcode::Entity::find()
                .filter(barcode::Column::BarcodeNumber.like(pattern.as_str()))
                .select_only()
                .column(barcode::Column::Id)
                .into_tuple()
                .all(db)
                .await?;
            let order_ids: Vec<i32> = order::Entity::find()
                .filter(order::Column::OrderNumber.like(pattern.as_str()))
                .select_only()
                .column(order::Column::Id)
                .into_tuple()
                .all(db)
                .await?;
            let customer_ids: Vec<i32> = customer::Entity::find()
                .filter(
                    Condition::any()
                        .add(customer::Column::Email.like(pattern.as_str()))
                        .add(customer::Column::FirstName.like(pattern.as_str()))
                        .add(customer::Column::LastName.like(pattern.as_str())),
                )
                .select_only()
                .column(customer::Column::Id)
                .into_tuple()
                .all(db)
                .await?;
            query = query.filter(
                Condition::any()
                    .add(kit_registration::Column::BarcodeId.is_in(barcode_ids))
                    .add(kit_registration::Column::OrderId.is_in(order_ids))
                    .add(kit_registration::Column::CustomerId.is_in(customer_ids)),
            );
        }

        let paginator = query
            .order_by_desc(kit_registration::Column::CreatedAt)
            .order_by_desc(kit_registration::Column::Id)
            .paginate(db, per_page.max(1));
        let total = paginator.num_items().await?;
        let rows = paginator.fetch_page(page.saturating_sub(1)).await?;

        let barcodes: HashMap<i32, barcode::Model> = barcode::Entity::find()
            .filter(barcode::Column::Id.is_in(rows.iter().map(|r| r.barcode_id)))
            .all(db)
            .await?
            .into_iter()
            .map(|b| (b.id, b))
            .collect();
        let orders: HashMap<i32, order::Model> = order::Entity::find()
            .filter(order::Column::Id.is_in(rows.iter().map(|r| r.order_id)))
            .all(db)
            .await?
            .into_iter()
            .map(|o| (o.id, o))
            .collect();
        let customers: HashMap<i32, customer::Model> = customer::Entity::find()
            .filter(customer::Column::Id.is_in(rows.iter().map(|r| r.customer_id)))
            .all(db)
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();
        let labs: HashMap<i32, lab::Model> = lab::Entity::find()
            .filter(lab::Column::Id.is_in(rows.iter().filter_map(|r| r.lab_id)))
            .all(db)
            .await?
            .into_iter()
            .map(|l| (l.id, l))
            .collect();

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let barcode_number = barcodes
                .get(&row.barcode_id)
                .map(|b| b.barcode_number.clone())
                .unwrap_or_default();
            let order = orders.get(&row.order_id);
            let customer = customers.get(&row.customer_id);
            let lab = row
                .lab_id
                .and_then(|id| labs.get(&id).cloned())
                .map(LabSummary::from);
            let file_url = row.file_path.as_deref().map(|f| self.settings.file_url(f));
            let order_id = row.order_id;
            items.push(RegistrationListItem {
                details: RegistrationDetails::decrypt(&self.cipher, row, lab)?,
                barcode_number,
                order_id,
                order_number: order.map(|o| o.order_number.clone()).unwrap_or_default(),
                customer_name: customer.map(|c| c.full_name()).unwrap_or_default(),
                customer_email: customer.map(|c| c.email.clone()).unwrap_or_default(),
                file_url,
            });
        }
        Ok((items, total))
    }
}
