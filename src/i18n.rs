//! Message catalog for the supported locales. Unknown keys translate to themselves.

use std::fmt;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Locale {
    #[default]
    En,
    Nl,
}

impl Locale {
    pub fn parse(tag: &str) -> Option<Locale> {
        let primary = tag.trim().split(['-', '_']).next().unwrap_or("");
        match primary.to_ascii_lowercase().as_str() {
            "en" => Some(Locale::En),
            "nl" => Some(Locale::Nl),
            _ => None,
        }
    }

    /// Best supported locale from an `Accept-Language` header, honouring q-values.
    pub fn from_accept_language(header: &str) -> Option<Locale> {
        let mut candidates: Vec<(f32, usize, Locale)> = header
            .split(',')
            .enumerate()
            .filter_map(|(i, part)| {
                let mut pieces = part.split(';');
                let locale = Locale::parse(pieces.next()?)?;
                let q = pieces
                    .find_map(|p| p.trim().strip_prefix("q="))
                    .and_then(|q| q.parse::<f32>().ok())
                    .unwrap_or(1.0);
                (q > 0.0).then_some((q, i, locale))
            })
            .collect();
        candidates.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        candidates.first().map(|c| c.2)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::Nl => "nl",
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// (key, en, nl)
const CATALOG: &[(&str, &str, &str)] = &[
    ("error_bad_request", "Bad request", "Ongeldig verzoek"),
    ("error_not_found", "Not found", "Niet gevonden"),
    ("error_validation", "Validation error", "Validatiefout"),
    ("error_internal", "Internal server error", "Interne serverfout"),
    ("empty_post_body", "Empty POST body", "Lege POST-body"),
    ("empty_put_body", "Empty PUT body", "Lege PUT-body"),
    (
        "missing_page_and_start_index",
        "Either pageIndex or startIndex is required",
        "pageIndex of startIndex is verplicht",
    ),
    ("unsupported_operation", "Operation not allowed", "Bewerking niet toegestaan"),
    ("successfully", "successfully", "succesvol"),
    ("retrieve", "retrieve", "ophalen"),
    ("retrieved", "retrieved", "opgehaald"),
    ("retrieving", "retrieving", "ophalen"),
    ("create", "create", "aanmaken"),
    ("created", "created", "aangemaakt"),
    ("creating", "creating", "aanmaken"),
    ("update", "update", "bijwerken"),
    ("updated", "updated", "bijgewerkt"),
    ("updating", "updating", "bijwerken"),
    ("delete", "delete", "verwijderen"),
    ("deleted", "deleted", "verwijderd"),
    ("deleting", "deleting", "verwijderen"),
    ("book", "book", "boek"),
];

pub fn translate(locale: Locale, key: &str) -> String {
    CATALOG
        .iter()
        .find(|(k, _, _)| *k == key)
        .map(|(_, en, nl)| match locale {
            Locale::En => *en,
            Locale::Nl => *nl,
        })
        .unwrap_or(key)
        .to_string()
}

/// Verb forms used in success messages, per HTTP method.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HttpVerb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpVerb {
    fn forms(self) -> [&'static str; 3] {
        match self {
            HttpVerb::Get => ["retrieve", "retrieved", "retrieving"],
            HttpVerb::Post => ["create", "created", "creating"],
            HttpVerb::Put | HttpVerb::Patch => ["update", "updated", "updating"],
            HttpVerb::Delete => ["delete", "deleted", "deleting"],
        }
    }

    pub fn do_(self, locale: Locale) -> String {
        translate(locale, self.forms()[0])
    }

    pub fn done(self, locale: Locale) -> String {
        translate(locale, self.forms()[1])
    }

    pub fn doing(self, locale: Locale) -> String {
        translate(locale, self.forms()[2])
    }
}

/// "Book successfully deleted"
pub fn success_message(locale: Locale, resource_key: &str, verb: HttpVerb) -> String {
    let name = capitalize(&translate(locale, resource_key));
    format!("{} {} {}", name, translate(locale, "successfully"), verb.done(locale))
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_keys_fall_back_to_the_key() {
        assert_eq!(translate(Locale::Nl, "no_such_key"), "no_such_key");
        assert_eq!(translate(Locale::Nl, "error_not_found"), "Niet gevonden");
    }

    #[test]
    fn accept_language_prefers_highest_quality() {
        assert_eq!(Locale::from_accept_language("nl-NL,nl;q=0.9,en;q=0.8"), Some(Locale::Nl));
        assert_eq!(Locale::from_accept_language("fr, en;q=0.5, nl;q=0.7"), Some(Locale::Nl));
        assert_eq!(Locale::from_accept_language("fr"), None);
        assert_eq!(Locale::from_accept_language("nl;q=0, en"), Some(Locale::En));
    }

    #[test]
    fn verbs_and_success_messages() {
        assert_eq!(HttpVerb::Patch.do_(Locale::En), "update");
        assert_eq!(HttpVerb::Get.doing(Locale::En), "retrieving");
        assert_eq!(success_message(Locale::En, "book", HttpVerb::Delete), "Book successfully deleted");
        assert_eq!(success_message(Locale::Nl, "book", HttpVerb::Post), "Boek succesvol aangemaakt");
        assert_eq!(success_message(Locale::En, "author", HttpVerb::Put), "Author successfully updated");
    }
}
