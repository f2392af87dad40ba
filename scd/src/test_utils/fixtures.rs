use chrono::NaiveDateTime;

use crate::staging::RawStagedRecord;

/// Parses a `%Y-%m-%d %H:%M:%S` timestamp.
pub fn at(timestamp: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%d %H:%M:%S").unwrap()
}

/// Builder for [`RawStagedRecord`] values.
///
/// Starts from a fully populated order so tests only spell out what they vary.
#[derive(Debug, Clone)]
pub struct StagedRecordBuilder {
    record: RawStagedRecord,
}

impl StagedRecordBuilder {
    pub fn new(order_id: &str) -> Self {
        Self {
            record: RawStagedRecord {
                order_id: Some(order_id.to_string()),
                customer_id: Some(format!("customer-of-{order_id}")),
                order_status: Some("processing".to_string()),
                order_purchase_timestamp: Some("2017-10-02 10:56:33".to_string()),
                order_approved_at: Some("2017-10-02 11:07:15".to_string()),
                order_delivered_carrier_date: None,
                order_delivered_customer_date: None,
                order_estimated_delivery_date: Some("2017-10-18 00:00:00".to_string()),
                load_timestamp: Some("2024-01-01 06:00:00".to_string()),
            },
        }
    }

    pub fn status(mut self, status: &str) -> Self {
        self.record.order_status = Some(status.to_string());
        self
    }

    pub fn customer(mut self, customer_id: &str) -> Self {
        self.record.customer_id = Some(customer_id.to_string());
        self
    }

    pub fn loaded_at(mut self, load_timestamp: &str) -> Self {
        self.record.load_timestamp = Some(load_timestamp.to_string());
        self
    }

    pub fn without_load_timestamp(mut self) -> Self {
        self.record.load_timestamp = None;
        self
    }

    pub fn delivered_carrier_at(mut self, timestamp: &str) -> Self {
        self.record.order_delivered_carrier_date = Some(timestamp.to_string());
        self
    }

    pub fn delivered_customer_at(mut self, timestamp: &str) -> Self {
        self.record.order_delivered_customer_date = Some(timestamp.to_string());
        self
    }

    pub fn build(self) -> RawStagedRecord {
        self.record
    }
}

/// Shorthand for a staged record with a status and a load timestamp.
pub fn staged(order_id: &str, status: &str, load_timestamp: &str) -> RawStagedRecord {
    StagedRecordBuilder::new(order_id)
        .status(status)
        .loaded_at(load_timestamp)
        .build()
}

/// The header line of a staging export, loaded as if it were data.
pub fn header_row() -> RawStagedRecord {
    RawStagedRecord {
        order_id: Some("order_id".to_string()),
        customer_id: Some("customer_id".to_string()),
        order_status: Some("order_status".to_string()),
        order_purchase_timestamp: Some("order_purchase_timestamp".to_string()),
        order_approved_at: Some("order_approved_at".to_string()),
        order_delivered_carrier_date: Some("order_delivered_carrier_date".to_string()),
        order_delivered_customer_date: Some("order_delivered_customer_date".to_string()),
        order_estimated_delivery_date: Some("order_estimated_delivery_date".to_string()),
        load_timestamp: Some("load_timestamp".to_string()),
    }
}
