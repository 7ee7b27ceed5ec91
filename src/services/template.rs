//! Template rendering: `{{token}}` resolution against contact identity
//! aliases and per-batch custom variables.
//!
//! Resolution priority per token:
//! 1. reserved identity aliases (name-like → contact name, phone-like →
//!    canonical phone),
//! 2. case-insensitive trimmed lookup into the batch's custom variables,
//! 3. unresolved tokens echo back intact so downstream consumers can spot
//!    missing data; a diagnostic is emitted.
//!
//! Both `{{1}}` positional and `{{key}}` named forms resolve, in the same
//! template, against the same ordered variable list.

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::OnceLock;

static TOKEN_RE: OnceLock<Regex> = OnceLock::new();

fn token_re() -> &'static Regex {
    TOKEN_RE.get_or_init(|| Regex::new(r"\{\{\s*([^{}|]+?)\s*\}\}").expect("valid regex"))
}

const NAME_ALIASES: &[&str] = &["nome", "name", "cliente"];
const PHONE_ALIASES: &[&str] = &["telefone", "phone", "celular", "mobile", "whatsapp"];

/// Fallback when a name-like token resolves against a contact with no name.
const DEFAULT_CONTACT_NAME: &str = "Cliente";

/// Contact-scoped values a template resolves against.
#[derive(Debug, Clone)]
pub struct RenderContext<'a> {
    pub contact_name: Option<&'a str>,
    /// Canonicalized phone.
    pub phone: &'a str,
    pub variables: &'a HashMap<String, String>,
}

/// Scan a raw template body for `{{...}}` tokens, first-seen order, deduped.
pub fn discover_tokens(template: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for caps in token_re().captures_iter(template) {
        let token = caps[1].trim().to_string();
        if !seen.iter().any(|t: &String| t.eq_ignore_ascii_case(&token)) {
            seen.push(token);
        }
    }
    seen
}

/// Resolve one token by alias priority, then custom-variable lookup.
fn resolve_token(token: &str, ctx: &RenderContext) -> Option<String> {
    let key = token.trim().to_lowercase();

    if NAME_ALIASES.contains(&key.as_str()) {
        return Some(ctx.contact_name.unwrap_or(DEFAULT_CONTACT_NAME).to_string());
    }
    if PHONE_ALIASES.contains(&key.as_str()) {
        return Some(ctx.phone.to_string());
    }

    ctx.variables
        .iter()
        .find(|(k, _)| k.trim().eq_ignore_ascii_case(&key))
        .map(|(_, v)| v.clone())
}

/// Render a template body against the context.
///
/// `variables` is the ordered list the caller supplied; when absent or
/// empty, tokens are auto-discovered from the body. Rendering is idempotent
/// on placeholder-free text and deterministic given identical inputs.
pub fn render(template: &str, variables: Option<&[String]>, ctx: &RenderContext) -> String {
    let tokens: Vec<String> = match variables {
        Some(vars) if !vars.is_empty() => vars.to_vec(),
        _ => discover_tokens(template),
    };
    let resolved: Vec<Option<String>> = tokens.iter().map(|t| resolve_token(t, ctx)).collect();

    token_re()
        .replace_all(template, |caps: &Captures| {
            let name = caps[1].trim();

            // Positional form: {{1}} is the first variable in the list.
            if let Ok(index) = name.parse::<usize>() {
                if index >= 1 && index <= tokens.len() {
                    if let Some(value) = &resolved[index - 1] {
                        return value.clone();
                    }
                }
            }

            // Named form against the variable list.
            if let Some(pos) = tokens.iter().position(|t| t.trim().eq_ignore_ascii_case(name)) {
                if let Some(value) = &resolved[pos] {
                    return value.clone();
                }
            }

            // Token outside the supplied list still gets alias/variable lookup.
            if let Some(value) = resolve_token(name, ctx) {
                return value;
            }

            tracing::warn!(token = name, "unresolved template placeholder left intact");
            caps[0].to_string()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(vars: &'a HashMap<String, String>) -> RenderContext<'a> {
        RenderContext {
            contact_name: Some("Maria"),
            phone: "5511987654321",
            variables: vars,
        }
    }

    #[test]
    fn test_name_aliases_resolve_to_contact_name() {
        let vars = HashMap::new();
        let c = ctx(&vars);
        assert_eq!(render("Ola {{nome}}!", None, &c), "Ola Maria!");
        assert_eq!(render("Ola {{name}}!", None, &c), "Ola Maria!");
        assert_eq!(render("Ola {{Cliente}}!", None, &c), "Ola Maria!");
    }

    #[test]
    fn test_name_alias_default() {
        let vars = HashMap::new();
        let c = RenderContext {
            contact_name: None,
            phone: "5511987654321",
            variables: &vars,
        };
        assert_eq!(render("Ola {{nome}}!", None, &c), "Ola Cliente!");
    }

    #[test]
    fn test_phone_aliases() {
        let vars = HashMap::new();
        let c = ctx(&vars);
        assert_eq!(render("{{telefone}}", None, &c), "5511987654321");
        assert_eq!(render("{{whatsapp}}", None, &c), "5511987654321");
    }

    #[test]
    fn test_custom_variable_lookup_case_insensitive_trimmed() {
        let mut vars = HashMap::new();
        vars.insert(" Contrato ".to_string(), "C-123".to_string());
        let c = ctx(&vars);
        assert_eq!(render("Contrato: {{contrato}}", None, &c), "Contrato: C-123");
    }

    #[test]
    fn test_unresolved_token_echoed_back() {
        let vars = HashMap::new();
        let c = ctx(&vars);
        assert_eq!(render("Valor: {{valor}}", None, &c), "Valor: {{valor}}");
    }

    #[test]
    fn test_positional_and_named_forms_together() {
        let mut vars = HashMap::new();
        vars.insert("valor".to_string(), "R$ 50".to_string());
        let c = ctx(&vars);
        let supplied = vec!["nome".to_string(), "valor".to_string()];
        assert_eq!(
            render("{{1}}, seu desconto de {{valor}} vale ate {{2}}", Some(&supplied), &c),
            "Maria, seu desconto de R$ 50 vale ate R$ 50"
        );
    }

    #[test]
    fn test_auto_discovery_when_variables_empty() {
        let vars = HashMap::new();
        let c = ctx(&vars);
        let discovered = discover_tokens("Oi {{x}} tchau {{y}} de novo {{x}}");
        assert_eq!(discovered, vec!["x".to_string(), "y".to_string()]);
        // Empty explicit list behaves like auto-discovery
        let empty: Vec<String> = Vec::new();
        assert_eq!(
            render("Ola {{nome}}", Some(&empty), &c),
            render("Ola {{nome}}", None, &c)
        );
    }

    #[test]
    fn test_idempotent_on_plain_text() {
        let vars = HashMap::new();
        let c = ctx(&vars);
        let body = "Sem placeholders, nada muda.";
        assert_eq!(render(body, None, &c), body);
        assert_eq!(render(&render(body, None, &c), None, &c), body);
    }

    #[test]
    fn test_whitespace_inside_token() {
        let vars = HashMap::new();
        let c = ctx(&vars);
        assert_eq!(render("Ola {{ nome }}!", None, &c), "Ola Maria!");
    }

    #[test]
    fn test_two_distinct_tokens_auto_detected() {
        // Variables list empty, body has two distinct tokens
        let discovered = discover_tokens("Oi {{nome}}, contrato {{contrato}}");
        assert_eq!(discovered.len(), 2);
    }
}
