pub mod accounts;

pub mod prelude {
    pub use super::accounts::Entity as Accounts;
}
