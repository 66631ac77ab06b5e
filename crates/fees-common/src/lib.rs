//! OpenFees Common - Shared types for the school fee platform
//!
//! This crate provides the pieces every other OpenFees crate leans on:
//! - Error taxonomy (`FeeError` / `FeeResult`)
//! - Platform configuration
//! - Money presentation helpers
//! - Gateway ports (SMS and payment provider traits)
//! - Expiring reset-code store

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod gateway;
pub mod money;
pub mod reset;

pub use config::PlatformConfig;
pub use error::{FeeError, FeeResult};
pub use gateway::{CheckoutSession, PaymentGateway, PaymentVerification, SmsDelivery, SmsGateway};
pub use reset::ResetCodeStore;
