//! Address handling.
//!
//! Accounts and contacts are addressed as `local@domain/resource`. Discovery
//! only cares about the domain: everything after the first `@` (or the whole
//! string if there is none) up to the first `/`.

/// Extract the domain part of an address.
///
/// `"alice@example.org/phone"` yields `"example.org"`, `"example2.org/foo"`
/// yields `"example2.org"`, and the empty address yields the empty domain.
pub fn domain_of(address: &str) -> &str {
    let rest = match address.split_once('@') {
        Some((_, domain)) => domain,
        None => address,
    };

    match rest.split_once('/') {
        Some((domain, _)) => domain,
        None => rest,
    }
}

/// Strip the resource suffix, keeping `local@domain`.
///
/// Used to key offline deliveries so that replies for `bob@x/laptop` and
/// `bob@x` land on the same queue.
pub fn bare_address(address: &str) -> &str {
    match address.split_once('/') {
        Some((bare, _)) => bare,
        None => address,
    }
}
