pub mod messages;
pub mod stream;
pub mod users;

#[cfg(test)]
pub(crate) mod test_support;
