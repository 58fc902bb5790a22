//! Session commands.
//!
//! # Usage
//!
//! ```bash
//! shopfront login -e ana@example.com -p hunter22
//! shopfront register -e root@example.com -p hunter22 -r admin
//! shopfront whoami
//! shopfront refresh-token
//! shopfront logout
//! ```

use shopfront_client::Storefront;
use shopfront_client::api::Identity;
use shopfront_client::session::SessionError;
use shopfront_core::{Email, Role};

use crate::CliError;

/// Sign in and print the signed-in user.
pub async fn login(storefront: &Storefront, email: &str, password: &str) -> Result<(), CliError> {
    let email = Email::parse(email)?;
    let user = storefront.session().login(email.as_str(), password).await?;
    print_identity("Signed in as", &user);
    Ok(())
}

/// Create an account, sign it in and print it.
pub async fn register(
    storefront: &Storefront,
    email: &str,
    password: &str,
    role: Option<String>,
) -> Result<(), CliError> {
    let email = Email::parse(email)?;
    let user = storefront
        .session()
        .register(email.as_str(), password, role.map(Role::from))
        .await?;
    print_identity("Registered", &user);
    Ok(())
}

/// Sign out.
#[allow(clippy::print_stdout)]
pub fn logout(storefront: &Storefront) {
    storefront.session().logout();
    println!("Signed out");
}

/// Print the current session.
#[allow(clippy::print_stdout)]
pub fn whoami(storefront: &Storefront) {
    let session = storefront.session().current();
    match session.user() {
        Some(user) => print_identity("Signed in as", user),
        None => println!("Not signed in ({:?})", session.status()),
    }
}

/// Rotate the session tokens.
#[allow(clippy::print_stdout)]
pub async fn refresh_token(storefront: &Storefront) -> Result<(), CliError> {
    let result = storefront.session().refresh_tokens().await;
    if let Err(SessionError::Api(e)) = &result
        && e.is_auth()
    {
        println!("Refresh token rejected, sign in again");
    }
    result?;
    println!("Session tokens refreshed");
    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_identity(label: &str, user: &Identity) {
    let admin = if user.is_admin() { " [admin]" } else { "" };
    println!("{label} {} <{}>{admin}", user.display_name(), user.email);
}
