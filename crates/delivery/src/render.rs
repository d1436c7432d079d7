//! Message personalization: `{{placeholder}}` substitution from customer
//! attributes. Unknown placeholders render as empty, never as an error.

use outreach_core::types::Customer;

pub fn render_message(template: &str, customer: &Customer) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = after[..end].trim();
                if let Some(value) = customer.attribute(key) {
                    out.push_str(&value);
                }
                rest = &after[end + 2..];
            }
            None => {
                // Unterminated placeholder: emit literally.
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
