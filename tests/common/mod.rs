#![allow(dead_code, unused_imports)]

pub mod mock;

pub use entities::{Auction, Bid};
pub use mock::{MidCommitError, MockBehavior, MockSessionFactory, RollbackError, ROLLBACK_ERROR_CODE};
pub use repositories::{AuctionRepository, BidRepository};
