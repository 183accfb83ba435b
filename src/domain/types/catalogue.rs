//! Built-in type catalogue.

use super::{CompositeDef, PrimitiveKind, ScalarDef, TypeDef};

const EMAIL: &str = r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$";
const PHONE: &str = r"^\+[1-9]\d{1,14}$";
const URL: &str = r"^https?://[^\s/$.?#].[^\s]*$";
const SLUG: &str = r"^[a-z0-9]+(?:-[a-z0-9]+)*$";
const COLOR: &str = r"^#[0-9A-Fa-f]{6}$";

/// Every type a fresh registry starts with, in registration order.
pub fn builtin_types() -> Vec<TypeDef> {
    let mut types: Vec<TypeDef> = basic_scalars()
        .into_iter()
        .chain(rich_scalars())
        .map(TypeDef::Scalar)
        .collect();
    types.extend(composites().into_iter().map(TypeDef::Composite));
    types
}

fn basic_scalars() -> Vec<ScalarDef> {
    use PrimitiveKind::*;
    vec![
        ScalarDef::new("text", Text),
        ScalarDef::new("integer", Integer),
        ScalarDef::new("bigint", BigInt),
        ScalarDef::new("decimal", Decimal),
        ScalarDef::new("boolean", Boolean),
        ScalarDef::new("date", Date),
        ScalarDef::new("timestamp", Timestamp),
        ScalarDef::new("time", Time),
        ScalarDef::new("uuid", Uuid),
        ScalarDef::new("json", Json),
    ]
}

fn rich_scalars() -> Vec<ScalarDef> {
    use PrimitiveKind::*;
    vec![
        ScalarDef::new("email", Text)
            .with_pattern(EMAIL)
            .with_description("Email address"),
        ScalarDef::new("phoneNumber", Text)
            .with_pattern(PHONE)
            .with_description("E.164 phone number"),
        ScalarDef::new("url", Text).with_pattern(URL),
        ScalarDef::new("slug", Text).with_pattern(SLUG),
        ScalarDef::new("markdown", Text),
        ScalarDef::new("html", Text),
        ScalarDef::new("ipAddress", Inet),
        ScalarDef::new("macAddress", MacAddr),
        ScalarDef::new("money", Decimal)
            .with_range(Some(0.0), None)
            .with_target("NUMERIC(19,4)"),
        ScalarDef::new("percentage", Decimal)
            .with_range(Some(0.0), Some(100.0))
            .with_target("NUMERIC(5,2)"),
        ScalarDef::new("datetime", Timestamp),
        ScalarDef::new("duration", Interval),
        ScalarDef::new("latitude", Decimal)
            .with_range(Some(-90.0), Some(90.0))
            .with_target("NUMERIC(10,8)"),
        ScalarDef::new("longitude", Decimal)
            .with_range(Some(-180.0), Some(180.0))
            .with_target("NUMERIC(11,8)"),
        ScalarDef::new("image", Text).with_description("Image URL or storage key"),
        ScalarDef::new("file", Text).with_description("File URL or storage key"),
        ScalarDef::new("color", Text).with_pattern(COLOR),
    ]
}

fn composites() -> Vec<CompositeDef> {
    vec![
        CompositeDef::new("SimpleAddress")
            .required("street", "text")
            .required("city", "text")
            .required("state", "text")
            .required("zipCode", "text")
            .optional("country", "text"),
        CompositeDef::new("MoneyAmount")
            .required("amount", "money")
            .required("currency", "text"),
        CompositeDef::new("PersonName")
            .required("firstName", "text")
            .required("lastName", "text")
            .optional("middleName", "text")
            .optional("title", "text")
            .optional("suffix", "text"),
        CompositeDef::new("ContactInfo")
            .required("email", "email")
            .optional("phone", "phoneNumber")
            .optional("website", "url"),
        CompositeDef::new("DateRange")
            .required("start", "date")
            .optional("end", "date"),
        CompositeDef::new("GeoLocation")
            .required("latitude", "latitude")
            .required("longitude", "longitude"),
    ]
}
