//! Entity resolution - reporter and partner identities for a preferential sheet
//!
//! Economic blocks get the lowest priority on both sides: some agreements set
//! different tariffs for individual members of a block (e.g. several EFTA
//! agreements), so a block must never shadow a country match.

use std::sync::Arc;
use tracing::debug;

use crate::error::{PreferentialFailure, PreferentialParseError};
use crate::reference::{parse_code, AliasKind, CountryIdentity, Party, ReferenceData};

/// Alias sets tried for a reporter token, in order (blocks and codes follow)
const REPORTER_ALIAS_ORDER: &[AliasKind] = &[
    AliasKind::FullName,
    AliasKind::Abbreviation,
    AliasKind::OtherName,
    AliasKind::OtherAbbreviation,
];

/// Alias sets tried for each partner candidate, in order
const PARTNER_ALIAS_ORDER: &[AliasKind] = &[
    AliasKind::FullName,
    AliasKind::Abbreviation,
    AliasKind::OtherName,
    AliasKind::OtherAbbreviation,
    AliasKind::Iso3,
];

/// Separator between tokens of a preferential sheet name
const SHEET_NAME_SEPARATOR: char = '_';
/// Separator between parties of an agreement name
const AGREEMENT_SEPARATOR: char = '-';

/// Where a sheet sits: enough context to resolve both parties
#[derive(Debug, Clone, Copy)]
pub struct SheetContext<'a> {
    pub sheet_name: &'a str,
    pub agreement_name: &'a str,
    pub declared_country: Option<&'a str>,
}

/// Stateless resolver over shared reference data
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'r> {
    reference: &'r ReferenceData,
}

impl<'r> Resolver<'r> {
    pub fn new(reference: &'r ReferenceData) -> Self {
        Self { reference }
    }

    fn country_by_aliases(&self, token: &str, order: &[AliasKind]) -> Option<&'r Arc<CountryIdentity>> {
        order
            .iter()
            .find_map(|&kind| self.reference.lookup(kind, token))
    }

    /// Resolve the reporter: aliases, then block names, then numeric codes,
    /// then the declared country when that country is itself a block
    pub fn resolve_reporter(&self, token: Option<&str>, declared_country: Option<&str>) -> Option<Party> {
        if let Some(token) = token {
            if let Some(country) = self.country_by_aliases(token, REPORTER_ALIAS_ORDER) {
                return Some(Party::Country(country.clone()));
            }
            if let Some(block) = self.reference.block(token) {
                return Some(Party::Block(block.clone()));
            }
            if let Some(country) = parse_code(token).and_then(|code| self.reference.by_code(code)) {
                return Some(Party::Country(country.clone()));
            }
        }

        declared_country
            .and_then(|name| self.reference.block(name))
            .map(|block| Party::Block(block.clone()))
    }

    /// Resolve the partner from an ordered candidate pool. Every candidate is
    /// tried against country aliases first; only when none matches is the pool
    /// scanned again for economic-block names.
    ///
    /// Besides candidates equal to the reporter or declared country name, a
    /// candidate whose country has the reporter's numeric code is skipped too.
    pub fn resolve_partner(
        &self,
        candidates: &[String],
        reporter: &Party,
        declared_country: Option<&str>,
    ) -> Option<Party> {
        let excluded = |candidate: &str| {
            candidate == reporter.name() || Some(candidate) == declared_country
        };

        for candidate in candidates {
            if excluded(candidate.as_str()) {
                continue;
            }
            let Some(country) = self.country_by_aliases(candidate, PARTNER_ALIAS_ORDER) else {
                continue;
            };
            // An alias of the reporter itself ("MEX" for Mexico) is not a partner
            if reporter.code() == Some(country.numeric_code) {
                debug!(candidate = %candidate, reporter = %reporter, "candidate names the reporter");
                continue;
            }
            return Some(Party::Country(country.clone()));
        }

        candidates
            .iter()
            .filter(|candidate| !excluded(candidate.as_str()))
            .find_map(|candidate| self.reference.block(candidate))
            .map(|block| Party::Block(block.clone()))
    }

    /// Resolve both parties of a sheet
    pub fn resolve(
        &self,
        ctx: &SheetContext<'_>,
        reporter_token: Option<&str>,
    ) -> Result<(Party, Party), PreferentialParseError> {
        let reporter = self
            .resolve_reporter(reporter_token, ctx.declared_country)
            .ok_or_else(|| {
                PreferentialParseError::new(PreferentialFailure::UnresolvedReporter)
                    .with_sheet(ctx.sheet_name)
                    .with_agreement(ctx.agreement_name)
                    .with_reporter_token(reporter_token)
            })?;

        let candidates = partner_candidates(ctx.sheet_name, ctx.agreement_name);
        let partner = self
            .resolve_partner(&candidates, &reporter, ctx.declared_country)
            .ok_or_else(|| {
                PreferentialParseError::new(PreferentialFailure::UnresolvedPartner)
                    .with_sheet(ctx.sheet_name)
                    .with_agreement(ctx.agreement_name)
                    .with_reporter_token(reporter_token)
                    .with_candidates(&candidates)
            })?;

        debug!(
            sheet = %ctx.sheet_name,
            reporter = %reporter,
            partner = %partner,
            "parties resolved"
        );
        Ok((reporter, partner))
    }
}

/// Partner candidates in priority order: sheet-name tokens (the more
/// discriminative source), the whole agreement name, then its parts
pub fn partner_candidates(sheet_name: &str, agreement_name: &str) -> Vec<String> {
    sheet_name
        .split(SHEET_NAME_SEPARATOR)
        .map(|token| token.trim().to_string())
        .chain(std::iter::once(agreement_name.to_string()))
        .chain(
            agreement_name
                .split(AGREEMENT_SEPARATOR)
                .map(|token| token.trim().to_string()),
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::DEFAULT_ECONOMIC_BLOCKS;

    fn reference() -> ReferenceData {
        ReferenceData::new(
            vec![
                CountryIdentity::new("United States", 842)
                    .with_abbreviation("USA")
                    .with_iso3("USA"),
                CountryIdentity::new("Mexico", 484).with_iso3("MEX"),
                CountryIdentity::new("Chile", 152)
                    .with_other_name("Chile FTA")
                    .with_iso3("CHL"),
                CountryIdentity::new("Switzerland", 756)
                    .with_other_abbreviation("Switz.")
                    .with_iso3("CHE"),
                CountryIdentity::new("Iceland", 352).with_iso3("ISL"),
                // A country whose alias collides with a block name
                CountryIdentity::new("Eurasian Union Test Country", 999).with_abbreviation("EAEU"),
            ],
            DEFAULT_ECONOMIC_BLOCKS.iter().copied(),
        )
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    // -------------------------------------------------------------------------
    // REPORTER
    // -------------------------------------------------------------------------

    #[test]
    fn test_reporter_abbreviation() {
        let reference = reference();
        let resolver = Resolver::new(&reference);
        let reporter = resolver.resolve_reporter(Some("USA"), None).unwrap();
        assert_eq!(reporter.name(), "United States");
        assert_eq!(reporter.code(), Some(842));
    }

    #[test]
    fn test_reporter_resolution_is_repeatable() {
        let reference = reference();
        let resolver = Resolver::new(&reference);
        let first = resolver.resolve_reporter(Some("USA"), None);
        let second = resolver.resolve_reporter(Some("USA"), None);
        assert_eq!(first, second);
    }

    #[test]
    fn test_reporter_other_abbreviation() {
        let reference = reference();
        let resolver = Resolver::new(&reference);
        let reporter = resolver.resolve_reporter(Some("Switz."), None).unwrap();
        assert_eq!(reporter.name(), "Switzerland");
    }

    #[test]
    fn test_reporter_numeric_code() {
        let reference = reference();
        let resolver = Resolver::new(&reference);
        assert_eq!(resolver.resolve_reporter(Some("152"), None).unwrap().name(), "Chile");
        assert_eq!(resolver.resolve_reporter(Some("152.0"), None).unwrap().name(), "Chile");
    }

    #[test]
    fn test_reporter_block_name() {
        let reference = reference();
        let resolver = Resolver::new(&reference);
        let reporter = resolver.resolve_reporter(Some("EFTA"), None).unwrap();
        assert!(reporter.is_block());
        assert_eq!(reporter.name(), "EFTA");
    }

    #[test]
    fn test_reporter_country_alias_beats_block() {
        let reference = reference();
        let resolver = Resolver::new(&reference);
        let reporter = resolver.resolve_reporter(Some("EAEU"), None).unwrap();
        assert_eq!(reporter.code(), Some(999));
    }

    #[test]
    fn test_reporter_falls_back_to_declared_block() {
        let reference = reference();
        let resolver = Resolver::new(&reference);
        let reporter = resolver.resolve_reporter(Some("Unknown"), Some("MERCOSUR")).unwrap();
        assert_eq!(reporter.name(), "MERCOSUR");
        assert!(resolver.resolve_reporter(None, Some("SACU")).unwrap().is_block());
    }

    #[test]
    fn test_reporter_declared_country_must_be_block() {
        let reference = reference();
        let resolver = Resolver::new(&reference);
        assert!(resolver.resolve_reporter(Some("Unknown"), Some("Chile")).is_none());
        assert!(resolver.resolve_reporter(None, None).is_none());
    }

    #[test]
    fn test_reporter_iso3_is_not_tried() {
        let reference = reference();
        let resolver = Resolver::new(&reference);
        assert!(resolver.resolve_reporter(Some("CHL"), None).is_none());
    }

    // -------------------------------------------------------------------------
    // PARTNER CANDIDATES
    // -------------------------------------------------------------------------

    #[test]
    fn test_partner_candidates_order() {
        let candidates = partner_candidates("Mexico_Partner_Agreement", "Mexico-Chile FTA");
        assert_eq!(
            candidates,
            strings(&["Mexico", "Partner", "Agreement", "Mexico-Chile FTA", "Mexico", "Chile FTA"])
        );
    }

    #[test]
    fn test_partner_candidates_trim() {
        let candidates = partner_candidates("Preferential _ Chile ", "EFTA - Chile");
        assert_eq!(
            candidates,
            strings(&["Preferential", "Chile", "EFTA - Chile", "EFTA", "Chile"])
        );
    }

    // -------------------------------------------------------------------------
    // PARTNER
    // -------------------------------------------------------------------------

    #[test]
    fn test_partner_scenario_mexico_chile() {
        let reference = reference();
        let resolver = Resolver::new(&reference);
        let ctx = SheetContext {
            sheet_name: "Mexico_Partner_Agreement",
            agreement_name: "Mexico-Chile FTA",
            declared_country: Some("Mexico"),
        };
        let (reporter, partner) = resolver.resolve(&ctx, Some("Mexico")).unwrap();
        assert_eq!(reporter.name(), "Mexico");
        assert_eq!(partner.name(), "Chile");
        assert_eq!(partner.code(), Some(152));
    }

    #[test]
    fn test_partner_country_beats_earlier_block() {
        let reference = reference();
        let resolver = Resolver::new(&reference);
        let reporter = resolver.resolve_reporter(Some("Chile"), None).unwrap();
        let candidates = strings(&["EFTA", "Preferential", "Iceland"]);
        let partner = resolver.resolve_partner(&candidates, &reporter, None).unwrap();
        assert_eq!(partner.name(), "Iceland");
    }

    #[test]
    fn test_partner_country_alias_beats_block_name() {
        let reference = reference();
        let resolver = Resolver::new(&reference);
        let reporter = resolver.resolve_reporter(Some("Chile"), None).unwrap();
        let partner = resolver
            .resolve_partner(&strings(&["EAEU"]), &reporter, None)
            .unwrap();
        assert!(!partner.is_block());
        assert_eq!(partner.code(), Some(999));
    }

    #[test]
    fn test_partner_block_second_pass() {
        let reference = reference();
        let resolver = Resolver::new(&reference);
        let reporter = resolver.resolve_reporter(Some("Chile"), None).unwrap();
        let candidates = partner_candidates("Chile_EFTA", "EFTA-Chile");
        let partner = resolver.resolve_partner(&candidates, &reporter, None).unwrap();
        assert!(partner.is_block());
        assert_eq!(partner.name(), "EFTA");
    }

    #[test]
    fn test_partner_iso3() {
        let reference = reference();
        let resolver = Resolver::new(&reference);
        let reporter = resolver.resolve_reporter(Some("Mexico"), None).unwrap();
        let partner = resolver
            .resolve_partner(&strings(&["CHE"]), &reporter, None)
            .unwrap();
        assert_eq!(partner.name(), "Switzerland");
    }

    #[test]
    fn test_partner_skips_reporter_and_declared_country() {
        let reference = reference();
        let resolver = Resolver::new(&reference);
        let reporter = resolver.resolve_reporter(Some("USA"), None).unwrap();
        let candidates = strings(&["United States", "Mexico", "Chile"]);
        let partner = resolver
            .resolve_partner(&candidates, &reporter, Some("Mexico"))
            .unwrap();
        assert_eq!(partner.name(), "Chile");
    }

    #[test]
    fn test_partner_skips_reporter_aliases() {
        let reference = reference();
        let resolver = Resolver::new(&reference);
        let reporter = resolver.resolve_reporter(Some("Mexico"), None).unwrap();
        let partner = resolver
            .resolve_partner(&strings(&["MEX", "CHL"]), &reporter, None)
            .unwrap();
        assert_eq!(partner.name(), "Chile");
    }

    #[test]
    fn test_partner_block_reporter_is_skipped_in_block_pass() {
        let reference = reference();
        let resolver = Resolver::new(&reference);
        let reporter = resolver.resolve_reporter(Some("EFTA"), None).unwrap();
        let partner = resolver.resolve_partner(&strings(&["EFTA", "ASEAN"]), &reporter, None);
        assert_eq!(partner.unwrap().name(), "ASEAN");
    }

    #[test]
    fn test_unresolved_partner_error_carries_candidates() {
        let reference = reference();
        let resolver = Resolver::new(&reference);
        let ctx = SheetContext {
            sheet_name: "Preferential",
            agreement_name: "Mystery Agreement",
            declared_country: None,
        };
        let err = resolver.resolve(&ctx, Some("USA")).unwrap_err();
        assert_eq!(err.failure, PreferentialFailure::UnresolvedPartner);
        assert_eq!(err.candidates, strings(&["Preferential", "Mystery Agreement", "Mystery Agreement"]));
        assert_eq!(err.sheet.as_deref(), Some("Preferential"));
    }

    #[test]
    fn test_unresolved_reporter_error() {
        let reference = reference();
        let resolver = Resolver::new(&reference);
        let ctx = SheetContext {
            sheet_name: "Chile",
            agreement_name: "X-Chile",
            declared_country: Some("Atlantis"),
        };
        let err = resolver.resolve(&ctx, Some("Atlantis")).unwrap_err();
        assert_eq!(err.failure, PreferentialFailure::UnresolvedReporter);
        assert_eq!(err.reporter_token.as_deref(), Some("Atlantis"));
    }
}
