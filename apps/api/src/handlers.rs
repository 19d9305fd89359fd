pub mod health;
pub mod jits;
pub mod vms;

#[cfg(test)]
mod test_support;
