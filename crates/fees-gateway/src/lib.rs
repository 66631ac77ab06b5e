//! OpenFees Gateway - HTTP clients for the outbound providers
//!
//! Implements the `fees-common` gateway ports against the real provider
//! APIs: Arkesel for SMS delivery and Paystack for hosted checkout.
//! Workflows never see HTTP details; provider failures surface as
//! failed deliveries or gateway errors.

#![warn(missing_docs)]

pub mod payment;
pub mod sms;

pub use payment::PaystackClient;
pub use sms::ArkeselClient;
