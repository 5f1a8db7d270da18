//! Client-facing message strings. Clients match on these, so changing one is
//! an API change.

// Orders
pub const ORDER_CREATED: &str = "Order created successfully";
pub const ORDER_NOT_FOUND: &str = "Order not found";
pub const CUSTOMER_QUANTITY: &str = "Quantity must be exactly 1 for customer orders";
pub const CLINIC_QUANTITY: &str = "Quantity must be at least 25 for clinic orders";
pub const CLINIC_ID_REQUIRED: &str = "Clinic ID is required for clinic orders";
pub const CLINIC_ID_TOO_LONG: &str = "Clinic ID cannot exceed 100 characters";
pub const INVALID_CUSTOMER_TYPE: &str = "Type must be either 'customer' or 'clinic'";
pub const CLINIC_ID_MISSING_FOR_BOUND_EMAIL: &str =
    "This email is already registered for a clinic. Please provide a Clinic ID to continue.";
pub const CLINIC_ID_MISMATCH: &str =
    "This email is already registered with a different clinic. Please use a different email or provide the Clinic ID.";
pub const EMAIL_NOT_CLINIC: &str =
    "The email address is already registered. Please use a different email for clinic-related purposes";
pub const ORDER_NUMBER_EXHAUSTED: &str = "Failed to generate a unique order number";
pub const ORDER_STATUS_UPDATED: &str = "Order status updated successfully";
pub const INVALID_ORDER_STATUS: &str = "Invalid order status";
pub const ORDER_STATUS_UNCHANGED: &str = "The new status is the same as the current status";
pub const PAYMENT_NOT_COMPLETED: &str = "Payment has not been completed for this order";
pub const NO_BARCODES_ASSIGNED: &str = "Assign at least one QRCode/Barcode before updating the order status";
pub const TRACKING_ID_TOO_LONG: &str = "Tracking ID must be less than or equal to 50 characters";

// Barcodes
pub const NO_VALID_BARCODES: &str = "No valid barcodes provided";
pub const DUPLICATE_BARCODE_IN_REQUEST: &str = "Duplicate QRCode/Barcode in request";
pub const BARCODES_EXCEED_QUANTITY: &str = "Total number of barcodes would exceed order quantity";
pub const BARCODE_NOT_FOUND: &str = "No QRCode/Barcode found";

pub fn invalid_barcode_length(barcode: &str) -> String {
    format!(
        "Invalid QRCode/Barcode length for {}: must be 30 characters",
        barcode
    )
}

pub fn invalid_barcode_format(barcode: &str) -> String {
    format!(
        "Invalid QRCode/Barcode format for {}: must be either alphabetic or numeric, and no spaces",
        barcode
    )
}

pub fn barcode_already_assigned(barcode: &str) -> String {
    format!("QRCode/Barcode {} is already assigned", barcode)
}

pub fn barcodes_assigned(count: usize) -> String {
    format!("{} barcodes assigned successfully", count)
}

// Payments
pub const PAYMENT_NOT_FOUND: &str = "Payment not found";
pub const PAYMENT_ALREADY_PROCESSED: &str = "Payment already processed";
pub const PAYMENT_COMPLETED: &str = "Payment completed successfully";
pub const PAYMENT_CANCELLED: &str = "Payment was cancelled by the user";
pub const PAYMENT_FAILED: &str = "Payment processing failed";
pub const PAYMENT_CALLBACK_PARAMS: &str = "payment_id, token and action are required";
pub const INVOICE_ID_EXHAUSTED: &str = "Failed to generate a unique invoice ID";

// Kit registration
pub const KIT_ALREADY_REGISTERED: &str = "Kit registration already exists for this QRCode/Barcode";
pub const BARCODE_VERIFIED: &str = "QRCode/Barcode verified successfully";
pub const KIT_REGISTERED: &str = "Kit registered successfully";
pub const PATIENT_NOT_FOUND: &str = "Patient not found";
pub const PATIENT_DATA_INVALID: &str = "Invalid patient data";
pub const PATIENT_RECORD_MISMATCH: &str = "Order, customer and QRCode/Barcode do not match";
pub const INVALID_GENDER: &str = "Gender must be one of male, female or other";
pub const AGE_TOO_LOW: &str = "Patient must be at least 18 years old";
pub const AGE_TOO_HIGH: &str = "Age cannot exceed 150";

// Kit status
pub const INVALID_KIT_STATUS: &str = "Invalid status value";
pub const KIT_STATUS_UNCHANGED: &str = "The new status is the same as the current status";
pub const REASON_REQUIRED: &str = "Reason is mandatory for reject status";
pub const INVALID_LAB_TYPE: &str = "Type must be either 'new' or 'old' for send status";
pub const LAB_ID_REQUIRED: &str = "Lab ID is required when type is 'old'";
pub const LAB_NOT_FOUND: &str = "Specified lab ID does not exist";
pub const LAB_NAME_TOO_SHORT: &str = "Lab name must have at least 5 characters";
pub const LAB_NAME_TOO_LONG: &str = "Lab name cannot exceed 255 characters";
pub const LAB_ADDRESS_TOO_SHORT: &str = "Lab address must have at least 5 characters";
pub const LAB_ADDRESS_TOO_LONG: &str = "Lab address cannot exceed 255 characters";
pub const NHI_REQUIRED: &str = "NHI number is required when type is 'new'";
pub const NHI_TOO_LONG: &str = "NHI number cannot exceed 10 characters";
pub const NHI_INVALID: &str = "NHI number must be alphanumeric and may include '-'";
pub const PATIENT_STATUS_UPDATED: &str = "Patient status updated successfully";

pub fn transition_not_allowed(from: &str, to: &str) -> String {
    format!("Transition from {} to {} is not allowed", from, to)
}

// Reports
pub const REPORT_FILE_TYPE: &str = "Only PDF and XML files are allowed";
pub const REPORT_TOO_LARGE: &str = "File size exceeds 10 MB limit";
pub const REPORT_MISSING: &str = "No file uploaded";
pub const REPORT_UPLOADED: &str = "File uploaded successfully";
pub const REPORT_REQUIRES_SEND: &str = "Report can only be uploaded when kit status is Send";

// Inventory
pub const KIT_NOT_FOUND: &str = "Kit not found";
pub const KIT_CREATED: &str = "Kit added successfully";
pub const KIT_UPDATED: &str = "Kit updated successfully";
pub const KIT_DELETED: &str = "Kit deleted successfully";

// Products
pub const PRODUCT_VERIFIED: &str = "Product verified successfully";
pub const ENCRYPTED: &str = "Data encrypted successfully";

// Auth and notifications
pub const INVALID_CREDENTIALS: &str = "Invalid email or password";
pub const LOGIN_SUCCESS: &str = "Login successful";
pub const NOTIFICATION_NOT_FOUND: &str = "Notification not found";
pub const NO_ROLES_FOUND: &str = "No roles found for notification";
