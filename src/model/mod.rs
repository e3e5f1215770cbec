pub mod employee;
pub mod office;
pub mod payment;
pub mod payment_entry;
pub mod promotion;
pub mod role;
pub mod user;
