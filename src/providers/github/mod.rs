mod client;
mod provider;
pub mod types;

#[cfg(test)]
mod tests;

pub use client::GitHubClient;
