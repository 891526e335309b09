//! Scene prompt composition
//!
//! The prompt is a pure function of the request fields: menu keywords pick a
//! place, tone and channel go through fixed tables, and the pieces are joined
//! in a fixed order. Translation is a separate, fallible step.

use crate::error::Result;
use crate::inference::Translator;
use crate::types::{Channel, PlaceCategory, Tone};
use serde::{Deserialize, Serialize};

/// Menu keyword groups, checked in priority order
const PLACE_KEYWORDS: &[(PlaceCategory, &[&str])] = &[
    (PlaceCategory::Cafe, &["커피", "차", "음료"]),
    (PlaceCategory::KoreanRestaurant, &["밥", "국", "찌개"]),
    (PlaceCategory::JapaneseRestaurant, &["우동", "라멘", "스시"]),
    (PlaceCategory::WesternRestaurant, &["피자", "파스타"]),
    (PlaceCategory::FastFood, &["치킨", "버거"]),
    (PlaceCategory::DessertCafe, &["디저트", "케이크"]),
];

/// Language the composed prompt is written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PromptLanguage {
    /// Korean source phrases, translated before synthesis
    #[default]
    Korean,
    /// English phrases directly, no translation needed
    English,
}

/// Classify a menu name into a place category by keyword containment
#[must_use]
pub fn classify_menu(menu: &str) -> PlaceCategory {
    PLACE_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| menu.contains(k)))
        .map_or(PlaceCategory::Generic, |(category, _)| *category)
}

fn tone_phrase(tone: &Tone, language: PromptLanguage) -> &str {
    match (tone, language) {
        (Tone::Warm, PromptLanguage::Korean) => "따뜻하고 아늑한 분위기",
        (Tone::Humor, PromptLanguage::Korean) => "재미있고 유쾌한 분위기",
        (Tone::Premium, PromptLanguage::Korean) => "고급스럽고 세련된 분위기",
        (Tone::Plain, PromptLanguage::Korean) => "깔끔하고 단순한 분위기",
        (Tone::Warm, PromptLanguage::English) => "warm and cozy atmosphere",
        (Tone::Humor, PromptLanguage::English) => "fun and cheerful atmosphere",
        (Tone::Premium, PromptLanguage::English) => "luxurious and refined atmosphere",
        (Tone::Plain, PromptLanguage::English) => "clean and simple atmosphere",
        (Tone::Other(raw), _) => raw,
    }
}

fn channel_phrase(channel: &Channel, language: PromptLanguage) -> &'static str {
    match (channel, language) {
        (Channel::Feed, PromptLanguage::Korean) => "현실적인 사진 스타일, SNS 피드용",
        (Channel::Story, PromptLanguage::Korean) => "세로형 구도, 눈에 띄는 색감",
        (Channel::Feed, PromptLanguage::English) => "realistic photo style, for SNS feed",
        (Channel::Story, PromptLanguage::English) => "vertical composition, eye-catching colors",
        (Channel::Other(_), _) => "",
    }
}

/// Compose the scene prompt
///
/// `{place}, {context}, {tone phrase}, {channel phrase}, {closing phrase}`
#[must_use]
pub fn compose_prompt(
    menu: &str,
    context: &str,
    tone: &Tone,
    channel: &Channel,
    language: PromptLanguage,
) -> String {
    let category = classify_menu(menu);
    let (place, closing) = match language {
        PromptLanguage::Korean => (category.korean_phrase(), "실제 촬영한 듯한 배경"),
        PromptLanguage::English => (
            category.english_phrase(),
            "realistic photographed-looking background",
        ),
    };
    format!(
        "{}, {}, {}, {}, {}",
        place,
        context,
        tone_phrase(tone, language),
        channel_phrase(channel, language),
        closing
    )
}

/// Composes the prompt and runs it through the configured translator
pub struct PromptComposer<'a> {
    language: PromptLanguage,
    translator: Option<&'a dyn Translator>,
}

impl<'a> PromptComposer<'a> {
    #[must_use]
    pub fn new(language: PromptLanguage, translator: Option<&'a dyn Translator>) -> Self {
        Self {
            language,
            translator,
        }
    }

    /// Build the working-language prompt
    ///
    /// # Errors
    /// `ExternalService` if translation fails; the untranslated prompt is never
    /// used as a silent fallback.
    pub async fn compose(
        &self,
        menu: &str,
        context: &str,
        tone: &Tone,
        channel: &Channel,
    ) -> Result<String> {
        let prompt = compose_prompt(menu, context, tone, channel, self.language);
        tracing::debug!(prompt = %prompt, "composed scene prompt");
        match self.translator {
            Some(translator) => {
                let translated = translator.translate(&prompt).await?;
                tracing::debug!(prompt = %translated, "translated scene prompt");
                Ok(translated)
            },
            None => Ok(prompt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_menu_boundaries() {
        assert_eq!(classify_menu("커피"), PlaceCategory::Cafe);
        assert_eq!(
            classify_menu("커피").english_phrase(),
            "cozy café interior"
        );
        assert_eq!(classify_menu("라멘"), PlaceCategory::JapaneseRestaurant);
        assert_eq!(
            classify_menu("라멘").english_phrase(),
            "traditional Japanese-restaurant interior"
        );
        assert_eq!(classify_menu("알수없음"), PlaceCategory::Generic);
        assert_eq!(
            classify_menu("알수없음").english_phrase(),
            "realistic restaurant or shop interior"
        );
    }

    #[test]
    fn test_priority_order() {
        // Beverage terms win over later groups
        assert_eq!(classify_menu("녹차 케이크"), PlaceCategory::Cafe);
        assert_eq!(classify_menu("김치찌개"), PlaceCategory::KoreanRestaurant);
        assert_eq!(classify_menu("치즈 버거"), PlaceCategory::FastFood);
        assert_eq!(classify_menu("딸기 케이크"), PlaceCategory::DessertCafe);
    }

    #[test]
    fn test_korean_prompt_layout() {
        let prompt = compose_prompt(
            "아메리카노",
            "창가 자리",
            &Tone::parse("따뜻함"),
            &Channel::parse("피드"),
            PromptLanguage::Korean,
        );
        assert_eq!(
            prompt,
            "현실적인 식당이나 매장 내부, 창가 자리, 따뜻하고 아늑한 분위기, 현실적인 사진 스타일, SNS 피드용, 실제 촬영한 듯한 배경"
        );
    }

    #[test]
    fn test_english_prompt_fallbacks() {
        let prompt = compose_prompt(
            "커피",
            "morning light",
            &Tone::parse("빈티지"),
            &Channel::parse("reels"),
            PromptLanguage::English,
        );
        // Unknown tone is verbatim, unknown channel is empty
        assert_eq!(
            prompt,
            "cozy café interior, morning light, 빈티지, , realistic photographed-looking background"
        );
    }

    #[test]
    fn test_compose_is_deterministic() {
        let args = ("피자", "파티", Tone::Humor, Channel::Story);
        let a = compose_prompt(args.0, args.1, &args.2, &args.3, PromptLanguage::Korean);
        let b = compose_prompt(args.0, args.1, &args.2, &args.3, PromptLanguage::Korean);
        assert_eq!(a, b);
        assert!(a.starts_with("서양식 레스토랑 내부"));
    }
}
