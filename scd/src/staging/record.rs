/// Columns of the staging table, in table order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StagingColumn {
    OrderId,
    CustomerId,
    OrderStatus,
    OrderPurchaseTimestamp,
    OrderApprovedAt,
    OrderDeliveredCarrierDate,
    OrderDeliveredCustomerDate,
    OrderEstimatedDeliveryDate,
    LoadTimestamp,
}

impl StagingColumn {
    pub const ALL: [StagingColumn; 9] = [
        StagingColumn::OrderId,
        StagingColumn::CustomerId,
        StagingColumn::OrderStatus,
        StagingColumn::OrderPurchaseTimestamp,
        StagingColumn::OrderApprovedAt,
        StagingColumn::OrderDeliveredCarrierDate,
        StagingColumn::OrderDeliveredCustomerDate,
        StagingColumn::OrderEstimatedDeliveryDate,
        StagingColumn::LoadTimestamp,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StagingColumn::OrderId => "order_id",
            StagingColumn::CustomerId => "customer_id",
            StagingColumn::OrderStatus => "order_status",
            StagingColumn::OrderPurchaseTimestamp => "order_purchase_timestamp",
            StagingColumn::OrderApprovedAt => "order_approved_at",
            StagingColumn::OrderDeliveredCarrierDate => "order_delivered_carrier_date",
            StagingColumn::OrderDeliveredCustomerDate => "order_delivered_customer_date",
            StagingColumn::OrderEstimatedDeliveryDate => "order_estimated_delivery_date",
            StagingColumn::LoadTimestamp => "load_timestamp",
        }
    }
}

/// A staged order exactly as the ingestion job deposited it: every field is free-form text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawStagedRecord {
    pub order_id: Option<String>,
    pub customer_id: Option<String>,
    pub order_status: Option<String>,
    pub order_purchase_timestamp: Option<String>,
    pub order_approved_at: Option<String>,
    pub order_delivered_carrier_date: Option<String>,
    pub order_delivered_customer_date: Option<String>,
    pub order_estimated_delivery_date: Option<String>,
    pub load_timestamp: Option<String>,
}

impl RawStagedRecord {
    pub fn field(&self, column: StagingColumn) -> Option<&str> {
        let value = match column {
            StagingColumn::OrderId => &self.order_id,
            StagingColumn::CustomerId => &self.customer_id,
            StagingColumn::OrderStatus => &self.order_status,
            StagingColumn::OrderPurchaseTimestamp => &self.order_purchase_timestamp,
            StagingColumn::OrderApprovedAt => &self.order_approved_at,
            StagingColumn::OrderDeliveredCarrierDate => &self.order_delivered_carrier_date,
            StagingColumn::OrderDeliveredCustomerDate => &self.order_delivered_customer_date,
            StagingColumn::OrderEstimatedDeliveryDate => &self.order_estimated_delivery_date,
            StagingColumn::LoadTimestamp => &self.load_timestamp,
        };

        value.as_deref()
    }

    /// Returns the first column whose value repeats its own column name.
    ///
    /// Such rows are artifacts of concatenated CSV exports that kept their header line.
    pub fn header_column(&self) -> Option<StagingColumn> {
        StagingColumn::ALL.into_iter().find(|column| {
            self.field(*column)
                .is_some_and(|value| value.trim().eq_ignore_ascii_case(column.name()))
        })
    }
}
