use alloy::sol;

sol! {
    event TransferSent(address indexed sender, address indexed recipient, uint256 amount, string message);
}
