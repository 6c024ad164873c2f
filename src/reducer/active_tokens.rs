use crate::models::NATIVE_ASSET;
use ethers::types::Address;
use std::collections::BTreeSet;

/// Set of tokens to include in balance queries after observing `token`.
///
/// The native asset is always queried and never tracked as a token.
pub fn add_if_not_native(current: &BTreeSet<Address>, token: Address) -> BTreeSet<Address> {
    let mut next = current.clone();
    if token != NATIVE_ASSET {
        next.insert(token);
    }
    next
}

/// Drop the native sentinel from a set restored from an untrusted source.
pub fn sanitize(tokens: &BTreeSet<Address>) -> BTreeSet<Address> {
    tokens
        .iter()
        .copied()
        .filter(|token| *token != NATIVE_ASSET)
        .collect()
}
