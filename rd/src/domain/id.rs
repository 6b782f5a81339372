//! Domain ID generation
//!
//! All IDs use the format: `{6-char-hex}-{type}-{slug}`
//! Example: `9f3c2a-sess-pbl-blok-12-grup-a`

/// Generate a domain ID from type and title
pub fn generate_id(domain_type: &str, title: &str) -> String {
    // the tail of a v7 uuid is random; the head is wall-clock time and
    // repeats across calls in the same instant
    let uuid = uuid::Uuid::now_v7().simple().to_string();
    let hex = &uuid[uuid.len() - 6..];
    let slug = slugify(title);
    format!("{}-{}-{}", hex, domain_type, slug)
}

/// Slugify a title for use in IDs
fn slugify(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id_format() {
        let id = generate_id("sess", "PBL Blok 12 Grup A");
        let parts: Vec<&str> = id.splitn(3, '-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 6);
        assert_eq!(parts[1], "sess");
        assert_eq!(parts[2], "pbl-blok-12-grup-a");
    }

    #[test]
    fn test_slugify_collapses_punctuation() {
        assert_eq!(slugify("  Jurnal -- Reading!  "), "jurnal-reading");
        assert_eq!(slugify("CSR/THT (minggu 3)"), "csr-tht-minggu-3");
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = generate_id("conv", "same title");
        let b = generate_id("conv", "same title");
        assert_ne!(a, b);
    }
}
