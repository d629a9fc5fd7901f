use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{attributes_from, format_timestamp, require_str};
use crate::errors::ToolError;
use crate::mcp::catalog::{ToolDef, ToolRegistry};
use crate::services::lawmatics::models::{Company, Contact};
use crate::services::lawmatics::LawmaticsClient;
use crate::services::tool_executor::ToolHandler;

fn or_not_set(value: Option<String>) -> String {
    value.unwrap_or_else(|| "[Not set]".to_string())
}

pub fn format_contact(contact: &Contact) -> String {
    format!(
        "Contact ID: {}\nName: {} {}\nEmail: {}\nPhone: {}\nCreated: {}\nUpdated: {}",
        contact.id,
        contact.attr_text("first_name").unwrap_or_default(),
        contact.attr_text("last_name").unwrap_or_default(),
        or_not_set(
            contact
                .attr_text("email")
                .or_else(|| contact.attr_text("email_address"))
        ),
        or_not_set(
            contact
                .attr_text("phone")
                .or_else(|| contact.attr_text("phone_number"))
        ),
        format_timestamp(contact.attr_text("created_at").as_deref()),
        format_timestamp(contact.attr_text("updated_at").as_deref()),
    )
}

pub fn format_company(company: &Company) -> String {
    let mut text = format!(
        "Company ID: {}\nName: {}",
        company.id,
        or_not_set(company.attr_text("name"))
    );
    for (key, label) in [
        ("email", "Email"),
        ("phone", "Phone"),
        ("website", "Website"),
        ("full_address", "Address"),
    ] {
        if let Some(value) = company.attr_text(key) {
            text.push_str(&format!("\n{}: {}", label, value));
        }
    }
    text.push_str(&format!(
        "\nCreated: {}",
        format_timestamp(company.attr_text("created_at").as_deref())
    ));
    text
}

struct GetContact(Arc<LawmaticsClient>);

#[async_trait]
impl ToolHandler for GetContact {
    async fn handle(&self, args: Value) -> Result<String, ToolError> {
        let contact_id = require_str(&args, "contactId")?;
        let contact = self.0.get_contact(&contact_id).await?.data;
        Ok(format_contact(&contact))
    }
}

struct FindContactByEmail(Arc<LawmaticsClient>);

#[async_trait]
impl ToolHandler for FindContactByEmail {
    async fn handle(&self, args: Value) -> Result<String, ToolError> {
        let email = require_str(&args, "email")?;
        let not_found = || format!("No contact found matching the email address: \"{}\".", email);
        match self.0.find_contact_by_email(&email).await {
            Ok(response) if response.data.id.is_empty() => Ok(not_found()),
            Ok(response) => Ok(format!(
                "Contact found matching email address \"{}\":\n\n{}",
                email,
                format_contact(&response.data)
            )),
            Err(err) if err.status() == Some(404) => Ok(not_found()),
            Err(err) => Err(err.into()),
        }
    }
}

struct GetCompany(Arc<LawmaticsClient>);

#[async_trait]
impl ToolHandler for GetCompany {
    async fn handle(&self, args: Value) -> Result<String, ToolError> {
        let company_id = require_str(&args, "companyId")?;
        let company = self.0.get_company(&company_id).await?.data;
        Ok(format_company(&company))
    }
}

const CONTACT_ATTRIBUTES: &[(&str, &str)] = &[
    ("firstName", "first_name"),
    ("lastName", "last_name"),
    ("email", "email"),
    ("phone", "phone"),
];

const COMPANY_ATTRIBUTES: &[(&str, &str)] = &[
    ("name", "name"),
    ("email", "email"),
    ("phone", "phone"),
    ("website", "website"),
];

struct CreateContact(Arc<LawmaticsClient>);

#[async_trait]
impl ToolHandler for CreateContact {
    async fn handle(&self, args: Value) -> Result<String, ToolError> {
        let attributes = attributes_from(&args, CONTACT_ATTRIBUTES);
        let contact = self.0.create_contact(&attributes).await?.data;
        Ok(format!(
            "Contact created with ID: {}.\n\n{}",
            contact.id,
            format_contact(&contact)
        ))
    }
}

struct CreateCompany(Arc<LawmaticsClient>);

#[async_trait]
impl ToolHandler for CreateCompany {
    async fn handle(&self, args: Value) -> Result<String, ToolError> {
        let attributes = attributes_from(&args, COMPANY_ATTRIBUTES);
        let company = self.0.create_company(&attributes).await?.data;
        Ok(format!(
            "Company created with ID: {}.\n\n{}",
            company.id,
            format_company(&company)
        ))
    }
}

fn single_string(field: &str, description: &str) -> Value {
    json!({
        "type": "object",
        "properties": { field: { "type": "string", "description": description } },
        "required": [field]
    })
}

pub fn register_contact_tools(
    registry: &mut ToolRegistry,
    client: Arc<LawmaticsClient>,
) -> Result<(), ToolError> {
    registry.register(
        ToolDef::new(
            "get_contact",
            "Get a Lawmatics contact by ID",
            single_string("contactId", "The ID of the contact to get"),
        ),
        Arc::new(GetContact(client.clone())),
    )?;
    registry.register(
        ToolDef::new(
            "find_contact_by_email",
            "Find a Lawmatics contact by email address",
            single_string("email", "Email address to search for"),
        ),
        Arc::new(FindContactByEmail(client.clone())),
    )?;
    registry.register(
        ToolDef::new(
            "get_company",
            "Get a Lawmatics company by ID",
            single_string("companyId", "The ID of the company to get"),
        ),
        Arc::new(GetCompany(client.clone())),
    )?;
    registry.register(
        ToolDef::new(
            "create_contact",
            "Create a Lawmatics contact",
            json!({
                "type": "object",
                "properties": {
                    "firstName": { "type": "string", "description": "First name of the contact" },
                    "lastName": { "type": "string", "description": "Last name of the contact" },
                    "email": { "type": "string", "description": "Email address of the contact" },
                    "phone": { "type": "string", "description": "Phone number of the contact" }
                },
                "required": ["firstName", "lastName"]
            }),
        ),
        Arc::new(CreateContact(client.clone())),
    )?;
    registry.register(
        ToolDef::new(
            "create_company",
            "Create a Lawmatics company",
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "Company name" },
                    "email": { "type": "string" },
                    "phone": { "type": "string" },
                    "website": { "type": "string" }
                },
                "required": ["name"]
            }),
        ),
        Arc::new(CreateCompany(client)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contact_falls_back_to_alternate_fields() {
        let contact: Contact = serde_json::from_value(json!({
            "id": "c1",
            "attributes": { "first_name": "Ann", "last_name": "Lee", "email_address": "ann@x.test" }
        }))
        .unwrap();
        let text = format_contact(&contact);
        assert!(text.starts_with("Contact ID: c1\nName: Ann Lee\nEmail: ann@x.test\nPhone: [Not set]"));
    }

    #[test]
    fn company_lists_only_present_fields() {
        let company: Company = serde_json::from_value(json!({
            "id": 4,
            "attributes": { "name": "Acme", "website": "acme.test" }
        }))
        .unwrap();
        assert_eq!(
            format_company(&company),
            "Company ID: 4\nName: Acme\nWebsite: acme.test\nCreated: [Not set]"
        );
    }
}
