//! crates/studius_core/src/pricing.rs
//!
//! Credit pricing for every billable feature, in one place. Routes must not
//! carry their own cost constants; they name a [`Feature`] and ask this
//! module.

use crate::domain::SubscriptionPlan;

/// Credits granted to every new account.
pub const WELCOME_CREDITS: i32 = 10;

const BYTES_PER_MIB: i64 = 1_048_576;

/// A billable operation, identified by the slug written to the credit ledger
/// and accepted by the consume endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    /// Standard processing through the hosted parsing service.
    ProcessPdf,
    /// Budget processing with local extraction and the eco model.
    ProcessPdfEco,
    /// OCR processing for scanned documents.
    ProcessPdfOcr,
    /// Layout-aware premium parsing and the premium model.
    ProcessPdfPremium,
    /// Local extraction with the standard model.
    ProcessPdfRaw,
    ExamGeneration,
    ExamGenerationUltra,
    UltraFlashcards,
    UltraSummary,
}

impl Feature {
    pub fn slug(&self) -> &'static str {
        match self {
            Feature::ProcessPdf => "process-pdf",
            Feature::ProcessPdfEco => "process-pdf-eco",
            Feature::ProcessPdfOcr => "process-pdf-ocr",
            Feature::ProcessPdfPremium => "process-pdf-premium",
            Feature::ProcessPdfRaw => "process-pdf-raw",
            Feature::ExamGeneration => "generate-exam",
            Feature::ExamGenerationUltra => "generate-exam-ultra",
            Feature::UltraFlashcards => "ultra-flashcards",
            Feature::UltraSummary => "ultra-summary",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        match slug {
            "process-pdf" => Some(Feature::ProcessPdf),
            "process-pdf-eco" => Some(Feature::ProcessPdfEco),
            "process-pdf-ocr" => Some(Feature::ProcessPdfOcr),
            "process-pdf-premium" => Some(Feature::ProcessPdfPremium),
            "process-pdf-raw" => Some(Feature::ProcessPdfRaw),
            "generate-exam" => Some(Feature::ExamGeneration),
            "generate-exam-ultra" => Some(Feature::ExamGenerationUltra),
            "ultra-flashcards" => Some(Feature::UltraFlashcards),
            "ultra-summary" => Some(Feature::UltraSummary),
            _ => None,
        }
    }

    /// Ledger description shown to the user.
    pub fn ledger_label(&self) -> &'static str {
        match self {
            Feature::ProcessPdf => "Elaborazione PDF",
            Feature::ProcessPdfEco => "Elaborazione PDF (eco)",
            Feature::ProcessPdfOcr => "Elaborazione PDF (OCR)",
            Feature::ProcessPdfPremium => "Elaborazione PDF (premium)",
            Feature::ProcessPdfRaw => "Elaborazione PDF (testo)",
            Feature::ExamGeneration => "Generazione simulazione d'esame",
            Feature::ExamGenerationUltra => "Generazione simulazione d'esame Ultra",
            Feature::UltraFlashcards => "Generazione flashcard Ultra",
            Feature::UltraSummary => "Generazione riassunto Ultra",
        }
    }
}

/// Credit cost of a feature for a document of `page_count` pages and
/// `file_size_bytes` bytes. Features with flat pricing ignore both.
pub fn credit_cost(feature: Feature, page_count: i32, file_size_bytes: i64) -> i32 {
    match feature {
        Feature::ProcessPdfEco => 1,
        Feature::ProcessPdfRaw => 2,
        Feature::ProcessPdfOcr => 4,
        Feature::ProcessPdf => match page_count {
            p if p <= 10 => 2,
            p if p <= 50 => 4,
            _ => 6,
        },
        Feature::ProcessPdfPremium => {
            let mib = (file_size_bytes.max(0) as u64).div_ceil(BYTES_PER_MIB as u64);
            // cap applied in u64, so the size surcharge can never overflow i32
            3 + mib.div_ceil(2).min(9) as i32
        }
        Feature::ExamGeneration => 2,
        Feature::ExamGenerationUltra => 5,
        Feature::UltraFlashcards => 6,
        Feature::UltraSummary => 5,
    }
}

/// Credits granted on each billing cycle of a subscription.
pub fn monthly_credits(plan: SubscriptionPlan) -> i32 {
    match plan {
        SubscriptionPlan::Free => 0,
        SubscriptionPlan::Base => 200,
        SubscriptionPlan::Pro => 500,
    }
}

//=========================================================================================
// One-time credit packs
//=========================================================================================

#[derive(Debug, Clone, Copy)]
pub struct CreditPack {
    pub slug: &'static str,
    pub credits: i32,
    pub amount_cents: i64,
    pub label: &'static str,
}

pub const CREDIT_PACKS: &[CreditPack] = &[
    CreditPack {
        slug: "small",
        credits: 50,
        amount_cents: 499,
        label: "Pacchetto 50 crediti",
    },
    CreditPack {
        slug: "medium",
        credits: 120,
        amount_cents: 999,
        label: "Pacchetto 120 crediti",
    },
    CreditPack {
        slug: "large",
        credits: 300,
        amount_cents: 1_999,
        label: "Pacchetto 300 crediti",
    },
];

pub fn find_pack(slug: &str) -> Option<&'static CreditPack> {
    CREDIT_PACKS.iter().find(|p| p.slug == slug)
}

/// Maps a captured payment amount back to a pack. Used when fulfilling
/// payments that only carry the charged amount.
pub fn pack_for_amount(amount_cents: i64) -> Option<&'static CreditPack> {
    CREDIT_PACKS.iter().find(|p| p.amount_cents == amount_cents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_costs() {
        assert_eq!(credit_cost(Feature::ProcessPdfEco, 500, 0), 1);
        assert_eq!(credit_cost(Feature::ProcessPdfRaw, 500, 0), 2);
        assert_eq!(credit_cost(Feature::ProcessPdfOcr, 500, 0), 4);
        assert_eq!(credit_cost(Feature::ExamGeneration, 0, 0), 2);
        assert_eq!(credit_cost(Feature::ExamGenerationUltra, 0, 0), 5);
        assert_eq!(credit_cost(Feature::UltraFlashcards, 0, 0), 6);
        assert_eq!(credit_cost(Feature::UltraSummary, 0, 0), 5);
    }

    #[test]
    fn standard_cost_tiers_on_page_count() {
        assert_eq!(credit_cost(Feature::ProcessPdf, 1, 0), 2);
        assert_eq!(credit_cost(Feature::ProcessPdf, 10, 0), 2);
        assert_eq!(credit_cost(Feature::ProcessPdf, 11, 0), 4);
        assert_eq!(credit_cost(Feature::ProcessPdf, 50, 0), 4);
        assert_eq!(credit_cost(Feature::ProcessPdf, 51, 0), 6);
        assert_eq!(credit_cost(Feature::ProcessPdf, 400, 0), 6);
    }

    #[test]
    fn premium_cost_scales_with_size_and_caps() {
        // under one MiB rounds up to one
        assert_eq!(credit_cost(Feature::ProcessPdfPremium, 0, 200_000), 4);
        assert_eq!(credit_cost(Feature::ProcessPdfPremium, 0, 2 * BYTES_PER_MIB), 4);
        assert_eq!(credit_cost(Feature::ProcessPdfPremium, 0, 3 * BYTES_PER_MIB), 5);
        assert_eq!(credit_cost(Feature::ProcessPdfPremium, 0, 10 * BYTES_PER_MIB), 8);
        // 30 MiB would be 18, capped
        assert_eq!(credit_cost(Feature::ProcessPdfPremium, 0, 30 * BYTES_PER_MIB), 12);
        assert_eq!(credit_cost(Feature::ProcessPdfPremium, 0, 0), 3);
    }

    #[test]
    fn premium_cost_never_goes_negative_for_absurd_sizes() {
        // the consume endpoint accepts client-supplied sizes, so the formula
        // must stay at the cap instead of wrapping
        assert_eq!(credit_cost(Feature::ProcessPdfPremium, 0, 1_i64 << 52), 12);
        assert_eq!(credit_cost(Feature::ProcessPdfPremium, 0, i64::MAX), 12);
        assert_eq!(credit_cost(Feature::ProcessPdfPremium, 0, -1), 3);
    }

    #[test]
    fn slugs_round_trip() {
        let all = [
            Feature::ProcessPdf,
            Feature::ProcessPdfEco,
            Feature::ProcessPdfOcr,
            Feature::ProcessPdfPremium,
            Feature::ProcessPdfRaw,
            Feature::ExamGeneration,
            Feature::ExamGenerationUltra,
            Feature::UltraFlashcards,
            Feature::UltraSummary,
        ];
        for feature in all {
            assert_eq!(Feature::from_slug(feature.slug()), Some(feature));
        }
        assert_eq!(Feature::from_slug("process-pdf-v3"), None);
    }

    #[test]
    fn packs_resolve_by_slug_and_amount() {
        let pack = find_pack("medium").unwrap();
        assert_eq!(pack.credits, 120);
        assert_eq!(pack_for_amount(1_999).unwrap().slug, "large");
        assert!(pack_for_amount(123).is_none());
        assert!(find_pack("huge").is_none());
    }

    #[test]
    fn monthly_grants_by_plan() {
        assert_eq!(monthly_credits(SubscriptionPlan::Free), 0);
        assert_eq!(monthly_credits(SubscriptionPlan::Base), 200);
        assert_eq!(monthly_credits(SubscriptionPlan::Pro), 500);
    }
}
