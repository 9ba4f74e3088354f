pub mod accounts;
pub mod custom_types;
pub mod hire_deliveries;
pub mod hire_messages;
pub mod hire_quotes;
pub mod hire_tasks;
pub mod topup_invoices;
pub mod usage_log;
