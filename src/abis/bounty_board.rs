use alloy::sol;

sol! {
    event BountyOpened(address indexed creator, string bountyId, string title, string description, uint256 amount, uint256 deadline);
    event BountyClaimed(address indexed claimer, string bountyId, string contentUri);
}
