use super::handlers::{admin, health, resource, Message};
use crate::{keys::ApiKeyRecord, principal::Principal};
use utoipa::{
    openapi::{Contact, License},
    OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        resource::resource,
        admin::issue,
        admin::revoke,
        admin::rotate,
        admin::reveal,
        admin::toggle_block,
        admin::set_enabled,
        admin::status,
        admin::regenerate,
    ),
    components(schemas(
        health::Health,
        resource::AccessGranted,
        Message,
        ApiKeyRecord,
        Principal,
        admin::IssueKeyRequest,
        admin::IssuedKeyResponse,
        admin::RevealedKey,
        admin::KeyStatus,
        admin::EnabledRequest,
        admin::Regenerated,
    )),
    tags(
        (name = "sentinel", description = "API key protected resource"),
        (name = "admin", description = "Key lifecycle management"),
        (name = "health", description = "Liveness")
    )
)]
struct ApiDoc;

/// The `OpenAPI` document, with info taken from Cargo metadata.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.info.title = env!("CARGO_PKG_NAME").to_string();
    doc.info.version = env!("CARGO_PKG_VERSION").to_string();
    doc.info.description = optional_str(env!("CARGO_PKG_DESCRIPTION")).map(str::to_string);
    doc.info.contact = cargo_contact();
    doc.info.license = optional_str(env!("CARGO_PKG_LICENSE")).map(|identifier| {
        let mut license = License::new(identifier);
        license.identifier = Some(identifier.to_string());
        license
    });
    doc
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let primary = env!("CARGO_PKG_AUTHORS").split(';').next().map(str::trim)?;
    let (name, email) = match primary.find('<') {
        Some(start) => (
            primary[..start].trim(),
            primary[start + 1..].trim_end_matches('>').trim(),
        ),
        None => (primary, ""),
    };
    if name.is_empty() && email.is_empty() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = optional_str(name).map(str::to_string);
    contact.email = optional_str(email).map(str::to_string);
    Some(contact)
}

fn optional_str(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
