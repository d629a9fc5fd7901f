/// Environment-variable suffix for a security scheme: non-alphanumerics become `_`, then upper-cased.
pub fn scheme_env_suffix(scheme_name: &str) -> String {
    scheme_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .to_uppercase()
}

pub fn scheme_env_var(prefix: &str, scheme_name: &str) -> String {
    format!("{}_{}", prefix, scheme_env_suffix(scheme_name))
}
