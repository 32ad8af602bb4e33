//! Slug helpers shared by summaries, committees and skills.
//!
//! Slugs are lowercase ASCII letters, digits and single hyphens, with
//! latin accents folded ("Éducation populaire" → "education-populaire").

pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_hyphen = false;

    for ch in value.chars().flat_map(fold_char) {
        if ch.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }

    slug
}

/// Used when a name has no sluggable character at all
pub const FALLBACK_SLUG: &str = "membre";

/// Slug of `value`, never empty
pub fn slug_base(value: &str) -> String {
    match slugify(value) {
        slug if slug.is_empty() => FALLBACK_SLUG.to_string(),
        slug => slug,
    }
}

/// Appends `-2`, `-3`, ... to `base` until `is_taken` accepts the candidate
pub fn unique_slug(base: &str, mut is_taken: impl FnMut(&str) -> bool) -> String {
    let base = if base.is_empty() { FALLBACK_SLUG } else { base };

    if !is_taken(base) {
        return base.to_string();
    }

    (2..)
        .map(|n| format!("{}-{}", base, n))
        .find(|candidate| !is_taken(candidate.as_str()))
        .unwrap_or_else(|| base.to_string())
}

fn fold_char(ch: char) -> Vec<char> {
    let folded = match ch {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' => "a",
        'æ' | 'Æ' => "ae",
        'ç' | 'Ç' => "c",
        'è' | 'é' | 'ê' | 'ë' | 'È' | 'É' | 'Ê' | 'Ë' => "e",
        'ì' | 'í' | 'î' | 'ï' | 'Ì' | 'Í' | 'Î' | 'Ï' => "i",
        'ñ' | 'Ñ' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ø' => "o",
        'œ' | 'Œ' => "oe",
        'ù' | 'ú' | 'û' | 'ü' | 'Ù' | 'Ú' | 'Û' | 'Ü' => "u",
        'ý' | 'ÿ' | 'Ý' | 'Ÿ' => "y",
        'ß' => "ss",
        '+' => "-plus-",
        _ => return vec![ch],
    };

    folded.chars().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_names() {
        assert_eq!(slugify("Carl Mirabeau"), "carl-mirabeau");
        assert_eq!(slugify("  Gisèle   Berthoux "), "gisele-berthoux");
        assert_eq!(slugify("Lyon est En Marche !"), "lyon-est-en-marche");
        assert_eq!(slugify("Éducation populaire"), "education-populaire");
        assert_eq!(slugify("C++"), "c-plus-plus");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_unique_slug() {
        let taken = ["jean-dupont", "jean-dupont-2"];

        assert_eq!(
            unique_slug("jean-dupont", |s| taken.contains(&s)),
            "jean-dupont-3"
        );
        assert_eq!(unique_slug("marie", |s| taken.contains(&s)), "marie");
        assert_eq!(unique_slug("", |_| false), "membre");
    }

    #[test]
    fn test_slug_base_is_never_empty() {
        assert_eq!(slug_base("Carl Mirabeau"), "carl-mirabeau");
        assert_eq!(slug_base("!!! ???"), FALLBACK_SLUG);
        assert_eq!(slug_base(""), FALLBACK_SLUG);
    }
}
