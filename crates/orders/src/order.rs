//! Delivery order aggregate and its value types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use courier_core::{
    BranchId, CompanyId, DomainError, DomainResult, OrderId, StatusHistoryId, UserId, ValueObject,
};

use crate::identifier::TrackingNumber;
use crate::status::OrderStatus;

/// Package characteristics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDetail {
    pub is_fragile: bool,
    pub is_urgent: bool,
    pub weight_grams: Option<u32>,
    pub length_mm: Option<u32>,
    pub width_mm: Option<u32>,
    pub height_mm: Option<u32>,
    pub special_instructions: Option<String>,
}

/// Where the package is collected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickupAddress {
    pub contact_name: String,
    pub contact_phone: String,
    pub address_line1: String,
    pub address_line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: Option<String>,
    pub notes: Option<String>,
}

/// Where the package is delivered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAddress {
    pub recipient_name: String,
    pub recipient_phone: String,
    pub address_line1: String,
    pub address_line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: Option<String>,
    pub notes: Option<String>,
}

impl PickupAddress {
    fn validate(&self) -> DomainResult<()> {
        require("pickup_address.contact_name", &self.contact_name)?;
        require("pickup_address.contact_phone", &self.contact_phone)?;
        require("pickup_address.address_line1", &self.address_line1)?;
        require("pickup_address.city", &self.city)?;
        require("pickup_address.state", &self.state)
    }
}

impl DeliveryAddress {
    fn validate(&self) -> DomainResult<()> {
        require("delivery_address.recipient_name", &self.recipient_name)?;
        require("delivery_address.recipient_phone", &self.recipient_phone)?;
        require("delivery_address.address_line1", &self.address_line1)?;
        require("delivery_address.city", &self.city)?;
        require("delivery_address.state", &self.state)
    }
}

fn require(field: &str, value: &str) -> DomainResult<()> {
    if value.trim().is_empty() {
        Err(DomainError::required(field))
    } else {
        Ok(())
    }
}

fn present<T>(field: &str, value: Option<T>) -> DomainResult<T> {
    value.ok_or_else(|| DomainError::required(field))
}

/// Order creation request, as assembled by the calling layer.
///
/// Identity, tracking number and status are generated at creation and cannot
/// be supplied here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub company_id: Option<CompanyId>,
    pub branch_id: Option<BranchId>,
    pub client_id: Option<UserId>,
    /// Price in smallest currency unit (e.g., cents).
    pub price: u64,
    pub distance_meters: u64,
    pub pickup_time: Option<DateTime<Utc>>,
    pub delivery_deadline: Option<DateTime<Utc>>,
    pub requires_signature: bool,
    pub delivery_notes: Option<String>,
    pub package: Option<PackageDetail>,
    pub pickup_address: Option<PickupAddress>,
    pub delivery_address: Option<DeliveryAddress>,
}

/// A [`NewOrder`] that passed structural validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedOrder {
    pub company_id: CompanyId,
    pub branch_id: BranchId,
    pub client_id: UserId,
    pub details: OrderDetails,
    pub package: PackageDetail,
    pub pickup_address: PickupAddress,
    pub delivery_address: DeliveryAddress,
}

impl NewOrder {
    /// Check required fields and scheduling consistency.
    pub fn validate(self) -> DomainResult<ValidatedOrder> {
        let company_id = present("company_id", self.company_id)?;
        let branch_id = present("branch_id", self.branch_id)?;
        let client_id = present("client_id", self.client_id)?;
        let pickup_time = present("pickup_time", self.pickup_time)?;
        let delivery_deadline = present("delivery_deadline", self.delivery_deadline)?;
        let package = present("package", self.package)?;
        let pickup_address = present("pickup_address", self.pickup_address)?;
        let delivery_address = present("delivery_address", self.delivery_address)?;

        pickup_address.validate()?;
        delivery_address.validate()?;

        if delivery_deadline < pickup_time {
            return Err(DomainError::validation(
                "delivery_deadline must not be before pickup_time",
            ));
        }

        Ok(ValidatedOrder {
            company_id,
            branch_id,
            client_id,
            details: OrderDetails {
                price: self.price,
                distance_meters: self.distance_meters,
                pickup_time,
                delivery_deadline,
                delivered_at: None,
                requires_signature: self.requires_signature,
                delivery_notes: self.delivery_notes,
            },
            package,
            pickup_address,
            delivery_address,
        })
    }
}

/// Pricing and scheduling of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetails {
    /// Price in smallest currency unit (e.g., cents).
    pub price: u64,
    pub distance_meters: u64,
    pub pickup_time: DateTime<Utc>,
    pub delivery_deadline: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub requires_signature: bool,
    pub delivery_notes: Option<String>,
}

/// One past status of an order. Never mutated after insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub id: StatusHistoryId,
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub recorded_at: DateTime<Utc>,
}

/// QR artifact created alongside an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrCode {
    pub order_id: OrderId,
    pub qr_data: String,
}

impl ValueObject for QrCode {}

/// Aggregate root: delivery order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub tracking_number: TrackingNumber,
    pub status: OrderStatus,
    pub status_history: Vec<StatusHistoryEntry>,
    pub company_id: CompanyId,
    pub branch_id: BranchId,
    pub client_id: UserId,
    pub driver_id: Option<UserId>,
    pub details: OrderDetails,
    pub package: PackageDetail,
    pub pickup_address: PickupAddress,
    pub delivery_address: DeliveryAddress,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Assemble a freshly created order in its initial state.
    pub fn create(
        id: OrderId,
        tracking_number: TrackingNumber,
        initial: StatusHistoryEntry,
        validated: ValidatedOrder,
    ) -> Self {
        let now = initial.recorded_at;
        Self {
            id,
            tracking_number,
            status: initial.status,
            status_history: vec![initial],
            company_id: validated.company_id,
            branch_id: validated.branch_id,
            client_id: validated.client_id,
            driver_id: None,
            details: validated.details,
            package: validated.package,
            pickup_address: validated.pickup_address,
            delivery_address: validated.delivery_address,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Move to `entry.status` and record it. Callers check legality first.
    pub fn record_status(&mut self, entry: StatusHistoryEntry) {
        self.status = entry.status;
        self.updated_at = entry.recorded_at;
        if entry.status == OrderStatus::Delivered {
            self.details.delivered_at = Some(entry.recorded_at);
        }
        self.status_history.push(entry);
    }

    /// Overwrite every field present in `patch` (status included; recording
    /// the history entry is the caller's job).
    pub fn apply_patch(&mut self, patch: &OrderPatch, at: DateTime<Utc>) {
        if let Some(status) = patch.status {
            self.status = status;
            if status == OrderStatus::Delivered {
                self.details.delivered_at = Some(at);
            }
        }
        if let Some(price) = patch.price {
            self.details.price = price;
        }
        if let Some(distance) = patch.distance_meters {
            self.details.distance_meters = distance;
        }
        if let Some(pickup_time) = patch.pickup_time {
            self.details.pickup_time = pickup_time;
        }
        if let Some(deadline) = patch.delivery_deadline {
            self.details.delivery_deadline = deadline;
        }
        if let Some(requires_signature) = patch.requires_signature {
            self.details.requires_signature = requires_signature;
        }
        if let Some(notes) = &patch.delivery_notes {
            self.details.delivery_notes = Some(notes.clone());
        }
        if let Some(package) = &patch.package {
            self.package = package.clone();
        }
        if let Some(address) = &patch.pickup_address {
            self.pickup_address = address.clone();
        }
        if let Some(address) = &patch.delivery_address {
            self.delivery_address = address.clone();
        }
        self.updated_at = at;
    }
}

/// Field-level order update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPatch {
    pub status: Option<OrderStatus>,
    pub price: Option<u64>,
    pub distance_meters: Option<u64>,
    pub pickup_time: Option<DateTime<Utc>>,
    pub delivery_deadline: Option<DateTime<Utc>>,
    pub requires_signature: Option<bool>,
    pub delivery_notes: Option<String>,
    pub package: Option<PackageDetail>,
    pub pickup_address: Option<PickupAddress>,
    pub delivery_address: Option<DeliveryAddress>,
}

impl OrderPatch {
    pub fn is_empty(&self) -> bool {
        *self == OrderPatch::default()
    }

    /// Validate the address blocks carried by the patch and the schedule the
    /// patch would leave on `current`.
    pub fn validate(&self, current: &OrderDetails) -> DomainResult<()> {
        if let Some(address) = &self.pickup_address {
            address.validate()?;
        }
        if let Some(address) = &self.delivery_address {
            address.validate()?;
        }

        let pickup_time = self.pickup_time.unwrap_or(current.pickup_time);
        let delivery_deadline = self.delivery_deadline.unwrap_or(current.delivery_deadline);
        if delivery_deadline < pickup_time {
            return Err(DomainError::validation(
                "delivery_deadline must not be before pickup_time",
            ));
        }
        Ok(())
    }
}

/// Company listing filter and pagination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderQueryParams {
    pub status: Option<OrderStatus>,
    pub include_deleted: bool,
    /// 1-based page number.
    pub page: u32,
    pub page_size: u32,
}

impl OrderQueryParams {
    pub const DEFAULT_PAGE_SIZE: u32 = 20;
    pub const MAX_PAGE_SIZE: u32 = 100;

    pub fn new(page: Option<u32>, page_size: Option<u32>) -> Self {
        Self {
            status: None,
            include_deleted: false,
            page: page.unwrap_or(1).max(1),
            page_size: page_size
                .unwrap_or(Self::DEFAULT_PAGE_SIZE)
                .clamp(1, Self::MAX_PAGE_SIZE),
        }
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn including_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }

    pub fn limit(&self) -> u32 {
        self.page_size.clamp(1, Self::MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.max(1) - 1) * u64::from(self.limit())
    }

    /// Whether `order` passes the filter (pagination aside).
    pub fn matches(&self, order: &Order) -> bool {
        (self.include_deleted || !order.is_deleted())
            && self.status.is_none_or(|status| order.status == status)
    }
}

impl Default for OrderQueryParams {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// One page of a company listing plus the total match count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub total: u64,
}
