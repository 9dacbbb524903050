pub mod bounty_board;
pub mod tipjar;

pub use bounty_board::{BountyClaimed, BountyOpened};
pub use tipjar::TransferSent;
