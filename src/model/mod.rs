//! Domain records kept in the document store.

pub mod customer;
pub mod employee;
pub mod invoice;
pub mod task;

pub use customer::{Customer, CustomerField, CustomerUpdate, NewCustomer};
pub use employee::{Employee, NewEmployee};
pub use invoice::{Invoice, InvoiceItem, ItemFields, ItemStatus, StatusHistory};
pub use task::{NewTask, Priority, Task, TaskStatus};
