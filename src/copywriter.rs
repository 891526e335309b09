//! SNS copywriting and evaluation through a hosted chat model
//!
//! Each operation is one prompt in, one strict JSON document out. Replies
//! that do not parse are reported as generation failures rather than being
//! turned into placeholder results.

use crate::config::ServiceEndpoints;
use crate::error::{BannerError, Result};
use crate::types::Channel;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::instrument;

const SERVICE: &str = "openai";

/// Single-turn chat completion
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// # Errors
    /// `ExternalService` when the model endpoint fails.
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

/// OpenAI chat-completions client
#[derive(Debug, Clone)]
pub struct OpenAiChat {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    temperature: f32,
}

impl OpenAiChat {
    /// # Errors
    /// `ResourceUnavailable` when no API key is configured.
    pub fn new(client: reqwest::Client, endpoints: &ServiceEndpoints) -> Result<Self> {
        let api_key = endpoints
            .openai_api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| BannerError::resource_unavailable("OPENAI_API_KEY is not set"))?;
        Ok(Self {
            client,
            base_url: endpoints.openai_url.trim_end_matches('/').to_string(),
            model: endpoints.openai_model.clone(),
            api_key: api_key.to_string(),
            temperature: 0.7,
        })
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.temperature,
        };
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BannerError::from_http(SERVICE, &e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(BannerError::external_service(
                SERVICE,
                format!("HTTP {}: {}", status, detail.chars().take(200).collect::<String>()),
            ));
        }
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| BannerError::external_service(SERVICE, e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| BannerError::generation_failed("chat model returned no content"))
    }
}

/// Remove a surrounding Markdown code fence, if any
#[must_use]
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. `json`) on the opening line
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn parse_reply<T: DeserializeOwned>(raw: &str, what: &str) -> Result<T> {
    serde_json::from_str(strip_code_fences(raw)).map_err(|e| {
        tracing::warn!(error = %e, reply = raw, "unparseable {} reply", what);
        BannerError::generation_failed(format!("{} reply is not valid JSON: {}", what, e))
    })
}

/// Inputs for caption generation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyRequest {
    pub menu: String,
    pub context: String,
    pub tone: String,
    pub channel: String,
    #[serde(default)]
    pub required_words: Vec<String>,
    #[serde(default)]
    pub banned_words: Vec<String>,
}

/// Three captions, one advertising one-liner, five hashtags
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyResult {
    #[serde(default)]
    pub captions: Vec<String>,
    #[serde(default)]
    pub one_liner: String,
    #[serde(default)]
    pub hashtags: Vec<String>,
}

const COPYWRITER_SYSTEM: &str = "너는 SNS 마케팅 문구를 작성하는 카피라이터다.";

fn channel_guidance(channel: &Channel) -> &'static str {
    match channel {
        Channel::Feed => {
            "- 브랜드 대표성을 강조하고 설명을 풍부하게 작성\n\
             - 장기간 남아 브랜드 자산이 되므로 정돈된 톤 유지\n\
             - 대표 메뉴와 광고성 컨텐츠에 적합"
        },
        Channel::Story => {
            "- 짧고 임팩트 있게, 오늘의 순간을 담아라\n\
             - 친근한 톤과 이모지 활용\n\
             - 매일 올려도 부담 없는 즉흥적 컨텐츠에 적합"
        },
        Channel::Other(_) => "- 채널 특성에 맞게 자연스럽게 작성",
    }
}

fn copy_prompt(request: &CopyRequest) -> String {
    let channel = Channel::parse(&request.channel);
    format!(
        "메뉴: {menu}\n상황: {context}\n톤: {tone}\n채널: {channel}\n\
         필수 단어: {required}\n금지 단어: {banned}\n\n\
         채널 지침:\n{guidance}\n\n\
         위 조건에 맞는 SNS 캡션 3개, 한 줄 광고 1개, 해시태그 5개를 순수 JSON 형식으로만 생성해줘.\n\
         코드 블록이나 설명 문구는 붙이지 마.\n\n\
         출력 형식:\n\
         {{\"captions\": [\"...\", \"...\", \"...\"], \"one_liner\": \"...\", \"hashtags\": [\"...\", \"...\", \"...\", \"...\", \"...\"]}}",
        menu = request.menu,
        context = request.context,
        tone = request.tone,
        channel = request.channel,
        required = request.required_words.join(", "),
        banned = request.banned_words.join(", "),
        guidance = channel_guidance(&channel),
    )
}

/// Generate captions, a one-liner and hashtags
///
/// # Errors
/// - `ExternalService` if the model call fails
/// - `GenerationFailed` if the reply is not the expected JSON
#[instrument(skip_all, fields(menu = %request.menu))]
pub async fn generate_copy(model: &dyn ChatModel, request: &CopyRequest) -> Result<CopyResult> {
    let reply = model.complete(COPYWRITER_SYSTEM, &copy_prompt(request)).await?;
    let result: CopyResult = parse_reply(&reply, "copy")?;

    let banned: Vec<&String> = request
        .banned_words
        .iter()
        .filter(|w| !w.is_empty())
        .filter(|w| {
            result.captions.iter().any(|c| c.contains(w.as_str()))
                || result.one_liner.contains(w.as_str())
        })
        .collect();
    if !banned.is_empty() {
        tracing::warn!(?banned, "generated copy contains banned words");
    }
    Ok(result)
}

/// One scored evaluation dimension
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactorResult {
    pub score: u8,
    #[serde(default)]
    pub explanation: String,
}

/// The eight evaluation dimensions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationFactors {
    pub engagement: FactorResult,
    pub brand_consistency: FactorResult,
    pub emotional_appeal: FactorResult,
    pub hashtags: FactorResult,
    pub clarity: FactorResult,
    pub call_to_action: FactorResult,
    pub differentiation: FactorResult,
    pub trend_fit: FactorResult,
}

impl EvaluationFactors {
    fn all_mut(&mut self) -> [&mut FactorResult; 8] {
        [
            &mut self.engagement,
            &mut self.brand_consistency,
            &mut self.emotional_appeal,
            &mut self.hashtags,
            &mut self.clarity,
            &mut self.call_to_action,
            &mut self.differentiation,
            &mut self.trend_fit,
        ]
    }

    /// Factor names paired with their results, in report order
    #[must_use]
    pub fn entries(&self) -> Vec<(&'static str, &FactorResult)> {
        vec![
            ("engagement", &self.engagement),
            ("brand_consistency", &self.brand_consistency),
            ("emotional_appeal", &self.emotional_appeal),
            ("hashtags", &self.hashtags),
            ("clarity", &self.clarity),
            ("call_to_action", &self.call_to_action),
            ("differentiation", &self.differentiation),
            ("trend_fit", &self.trend_fit),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub overall_score: u8,
    pub factors: EvaluationFactors,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub recommendations: CopyResult,
}

const EVALUATOR_SYSTEM: &str = "너는 인스타그램 마케팅 전문가다.";

fn evaluation_prompt(caption: &str, one_liner: &str, hashtags: &[String]) -> String {
    format!(
        "캡션: {caption}\n한 줄 광고: {one_liner}\n해시태그: {hashtags}\n\n\
         위 문구를 다면적으로 평가해줘. 각 항목은 1~10점과 설명을 제공:\n\
         1. 참여도(engagement)\n2. 브랜드 일관성(brand_consistency)\n3. 감성 어필(emotional_appeal)\n\
         4. 해시태그 전략(hashtags)\n5. 간결성(clarity)\n6. 행동 유도성(call_to_action)\n\
         7. 차별성(differentiation)\n8. 트렌드 적합성(trend_fit)\n\n\
         마지막에 종합 점수(1~10)와 총평을 작성하고, 개선된 캡션 3개, 한 줄 광고 1개, 해시태그 5개를 추천해.\n\
         출력은 반드시 순수 JSON 형식으로만:\n\
         {{\"overall_score\": <int>, \"factors\": {{\"engagement\": {{\"score\": <int>, \"explanation\": \"...\"}}, ...}}, \
         \"summary\": \"...\", \"recommendations\": {{\"captions\": [], \"one_liner\": \"\", \"hashtags\": []}}}}",
        hashtags = hashtags.join(", "),
    )
}

/// Score a caption set across eight factors
///
/// Scores are clamped to `1..=10`.
///
/// # Errors
/// - `ExternalService` if the model call fails
/// - `GenerationFailed` if the reply is missing fields or is not JSON
#[instrument(skip_all)]
pub async fn evaluate_copy(
    model: &dyn ChatModel,
    caption: &str,
    one_liner: &str,
    hashtags: &[String],
) -> Result<EvaluationResult> {
    let reply = model
        .complete(EVALUATOR_SYSTEM, &evaluation_prompt(caption, one_liner, hashtags))
        .await?;
    let mut result: EvaluationResult = parse_reply(&reply, "evaluation")?;
    result.overall_score = result.overall_score.clamp(1, 10);
    for factor in result.factors.all_mut() {
        factor.score = factor.score.clamp(1, 10);
    }
    Ok(result)
}

/// Target audience description
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaFeedback {
    pub score: u8,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakdownItem {
    pub score: u8,
    #[serde(default)]
    pub reason: String,
}

/// Model reply for one persona
#[derive(Debug, Deserialize)]
struct PersonaReply {
    overall_score: u8,
    #[serde(default)]
    feedback: String,
    caption_feedback: PersonaFeedback,
    one_liner_feedback: PersonaFeedback,
    hashtags_feedback: PersonaFeedback,
    #[serde(default)]
    breakdown: BTreeMap<String, BreakdownItem>,
    #[serde(default)]
    improvement: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaEvaluation {
    pub persona_id: String,
    pub persona_name: String,
    pub overall_score: u8,
    pub feedback: String,
    pub caption_feedback: PersonaFeedback,
    pub one_liner_feedback: PersonaFeedback,
    pub hashtags_feedback: PersonaFeedback,
    /// Keyed by `emotion`, `offer`, `cta`, `local`, `trend`
    pub breakdown: BTreeMap<String, BreakdownItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaSummary {
    pub best_persona_id: Option<String>,
    pub average_score: u8,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaEvaluationResponse {
    pub results: Vec<PersonaEvaluation>,
    pub summary: PersonaSummary,
}

fn persona_prompt(copy: &CopyResult, persona: &Persona) -> String {
    format!(
        "페르소나: {name}\n설명: {description}\n\n\
         캡션: {captions}\n한 줄 광고: {one_liner}\n해시태그: {hashtags}\n\n\
         이 페르소나의 관점에서 문구의 적합도를 0~100점으로 평가해줘.\n\
         세부 항목(emotion, offer, cta, local, trend)별 점수와 이유, \
         캡션/한 줄 광고/해시태그 각각의 점수와 코멘트, 한 문장 개선점을 포함해.\n\
         출력은 반드시 순수 JSON 형식으로만:\n\
         {{\"overall_score\": <int>, \"feedback\": \"...\", \
         \"caption_feedback\": {{\"score\": <int>, \"comment\": \"...\"}}, \
         \"one_liner_feedback\": {{\"score\": <int>, \"comment\": \"...\"}}, \
         \"hashtags_feedback\": {{\"score\": <int>, \"comment\": \"...\"}}, \
         \"breakdown\": {{\"emotion\": {{\"score\": <int>, \"reason\": \"...\"}}, ...}}, \
         \"improvement\": \"...\"}}",
        name = persona.name,
        description = persona.description,
        captions = copy.captions.join(" / "),
        one_liner = copy.one_liner,
        hashtags = copy.hashtags.join(", "),
    )
}

fn clamp_percent(score: u8) -> u8 {
    score.min(100)
}

/// Score a copy set against each persona, then summarize
///
/// Each persona is one model call. Scores are clamped to `0..=100`; the best
/// persona is the highest overall score, ties going to the earlier persona.
///
/// # Errors
/// The first persona whose call or reply fails aborts the evaluation.
#[instrument(skip_all, fields(personas = personas.len()))]
pub async fn evaluate_personas(
    model: &dyn ChatModel,
    copy: &CopyResult,
    personas: &[Persona],
) -> Result<PersonaEvaluationResponse> {
    let mut results = Vec::with_capacity(personas.len());
    let mut notes: Vec<String> = Vec::new();

    for persona in personas {
        let reply = model
            .complete(EVALUATOR_SYSTEM, &persona_prompt(copy, persona))
            .await?;
        let parsed: PersonaReply = parse_reply(&reply, "persona evaluation")?;

        let improvement = parsed.improvement.trim();
        if !improvement.is_empty() && !notes.iter().any(|n| n == improvement) {
            notes.push(improvement.to_string());
        }

        let clamp = |mut f: PersonaFeedback| {
            f.score = clamp_percent(f.score);
            f
        };
        results.push(PersonaEvaluation {
            persona_id: persona.id.clone(),
            persona_name: persona.name.clone(),
            overall_score: clamp_percent(parsed.overall_score),
            feedback: parsed.feedback,
            caption_feedback: clamp(parsed.caption_feedback),
            one_liner_feedback: clamp(parsed.one_liner_feedback),
            hashtags_feedback: clamp(parsed.hashtags_feedback),
            breakdown: parsed
                .breakdown
                .into_iter()
                .map(|(k, mut v)| {
                    v.score = clamp_percent(v.score);
                    (k, v)
                })
                .collect(),
        });
    }

    let best_persona_id = results
        .iter()
        .fold(None::<&PersonaEvaluation>, |best, r| match best {
            Some(b) if b.overall_score >= r.overall_score => Some(b),
            _ => Some(r),
        })
        .map(|r| r.persona_id.clone());
    let average_score = if results.is_empty() {
        0
    } else {
        let total: u32 = results.iter().map(|r| u32::from(r.overall_score)).sum();
        ((total as f32 / results.len() as f32).round() as u32).min(100) as u8
    };

    Ok(PersonaEvaluationResponse {
        results,
        summary: PersonaSummary {
            best_persona_id,
            average_score,
            notes,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::{serve_json, MockChatModel};
    use crate::error::ErrorKind;

    fn request() -> CopyRequest {
        CopyRequest {
            menu: "아메리카노".into(),
            context: "비 오는 아침".into(),
            tone: "따뜻함".into(),
            channel: "스토리".into(),
            required_words: vec!["신메뉴".into()],
            banned_words: vec!["할인".into()],
        }
    }

    fn factors_json(score: i32) -> serde_json::Value {
        let factor = serde_json::json!({ "score": score, "explanation": "ok" });
        serde_json::json!({
            "engagement": factor, "brand_consistency": factor, "emotional_appeal": factor,
            "hashtags": factor, "clarity": factor, "call_to_action": factor,
            "differentiation": factor, "trend_fit": factor
        })
    }

    fn persona_reply(score: u32) -> String {
        serde_json::json!({
            "overall_score": score,
            "feedback": "좋아요",
            "caption_feedback": { "score": 80, "comment": "c" },
            "one_liner_feedback": { "score": 150, "comment": "o" },
            "hashtags_feedback": { "score": 70, "comment": "h" },
            "breakdown": { "cta": { "score": 60, "reason": "약함" } },
            "improvement": "CTA를 보강하세요"
        })
        .to_string()
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n[]\n```  "), "[]");
        assert_eq!(strip_code_fences("  {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn test_prompt_carries_channel_guidance() {
        let prompt = copy_prompt(&request());
        assert!(prompt.contains("이모지"));
        assert!(prompt.contains("필수 단어: 신메뉴"));
        assert!(prompt.contains("금지 단어: 할인"));
    }

    #[tokio::test]
    async fn test_generate_copy_parses_fenced_json() {
        let model = MockChatModel::with_replies([
            "```json\n{\"captions\":[\"a\",\"b\",\"c\"],\"one_liner\":\"x\",\"hashtags\":[\"#1\"]}\n```",
        ]);
        let result = generate_copy(&model, &request()).await.unwrap();
        assert_eq!(result.captions.len(), 3);
        assert_eq!(result.one_liner, "x");
        assert_eq!(model.calls.len(), 1);
        assert!(model.calls.entries()[0].starts_with(COPYWRITER_SYSTEM));
    }

    #[tokio::test]
    async fn test_generate_copy_rejects_prose() {
        let model = MockChatModel::with_replies(["Sure! Here are some captions..."]);
        let err = generate_copy(&model, &request()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GenerationFailed);
    }

    #[tokio::test]
    async fn test_evaluate_copy_clamps_scores() {
        let reply = serde_json::json!({
            "overall_score": 0,
            "factors": factors_json(42),
            "summary": "good",
            "recommendations": { "captions": ["n"], "one_liner": "l", "hashtags": [] }
        });
        let model = MockChatModel::with_replies([reply.to_string()]);
        let result = evaluate_copy(&model, "cap", "one", &["#a".into()]).await.unwrap();
        assert_eq!(result.overall_score, 1);
        assert!(result.factors.entries().iter().all(|(_, f)| f.score == 10));
        assert_eq!(result.factors.entries().len(), 8);
        assert_eq!(result.recommendations.one_liner, "l");
    }

    #[tokio::test]
    async fn test_evaluate_copy_requires_all_factors() {
        let reply = serde_json::json!({
            "overall_score": 7,
            "factors": { "engagement": { "score": 7, "explanation": "" } }
        });
        let model = MockChatModel::with_replies([reply.to_string()]);
        let err = evaluate_copy(&model, "cap", "", &[]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GenerationFailed);
    }

    #[tokio::test]
    async fn test_evaluate_personas_summary() {
        let model = MockChatModel::with_replies([persona_reply(70), persona_reply(90), persona_reply(90)]);
        let personas = vec![
            Persona { id: "p1".into(), name: "직장인".into(), description: String::new() },
            Persona { id: "p2".into(), name: "대학생".into(), description: String::new() },
            Persona { id: "p3".into(), name: "가족".into(), description: String::new() },
        ];
        let copy = CopyResult {
            captions: vec!["c".into()],
            one_liner: "o".into(),
            hashtags: vec!["#h".into()],
        };
        let response = evaluate_personas(&model, &copy, &personas).await.unwrap();
        assert_eq!(response.results.len(), 3);
        assert_eq!(response.summary.best_persona_id.as_deref(), Some("p2"));
        assert_eq!(response.summary.average_score, 83);
        assert_eq!(response.summary.notes, vec!["CTA를 보강하세요".to_string()]);
        assert_eq!(response.results[0].one_liner_feedback.score, 100);
        assert_eq!(response.results[0].breakdown["cta"].score, 60);
    }

    #[tokio::test]
    async fn test_evaluate_no_personas() {
        let model = MockChatModel::default();
        let response = evaluate_personas(&model, &CopyResult::default(), &[])
            .await
            .unwrap();
        assert!(response.results.is_empty());
        assert_eq!(response.summary.best_persona_id, None);
        assert_eq!(response.summary.average_score, 0);
        assert!(model.calls.is_empty());
    }

    #[test]
    fn test_openai_requires_key() {
        let endpoints = ServiceEndpoints::default();
        let mut no_key = endpoints.clone();
        no_key.openai_api_key = None;
        let err = OpenAiChat::new(reqwest::Client::new(), &no_key).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceUnavailable);
    }

    #[tokio::test]
    async fn test_openai_over_http() {
        let reply = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "{\"captions\":[]}" } }]
        });
        let url = serve_json(vec![reply.to_string()]).await;
        let mut endpoints = ServiceEndpoints::default();
        endpoints.openai_url = url;
        endpoints.openai_api_key = Some("sk-test".into());
        let chat = OpenAiChat::new(reqwest::Client::new(), &endpoints).unwrap();
        assert_eq!(chat.complete("s", "u").await.unwrap(), "{\"captions\":[]}");
    }
}
