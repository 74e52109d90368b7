use crate::config::{CourseConfig, EngineSettings, IssueDatePolicy, Translation};
use crate::error::CertError;
use crate::markup;
use crate::naming;
use crate::template;
use chrono::{Locale, NaiveDate, NaiveTime, TimeZone, Utc};
use std::collections::BTreeMap;

const DATE_PATTERN: &str = "%B %-d, %Y";
const FALLBACK_LOCALE: &str = "en_US";

/// The render request for one student.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Student {
    pub name: String,
    pub grade: Option<String>,
    /// Overrides the course's issue date policy.
    pub issue_date: Option<NaiveDate>,
}

impl Student {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            grade: None,
            issue_date: None,
        }
    }

    pub fn with_grade(mut self, grade: impl Into<String>) -> Self {
        self.grade = Some(grade.into());
        self
    }

    pub fn with_issue_date(mut self, date: NaiveDate) -> Self {
        self.issue_date = Some(date);
        self
    }
}

/// Certificate phrases after layering built-ins, engine defaults and course translations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phrases {
    pub success_text: String,
    /// Formatted with `{grade}`.
    pub grade_interstitial: String,
    pub disclaimer_text: String,
    /// Formatted with `{verify_link}` and `{cert_label}`.
    pub verify_text: String,
}

impl Phrases {
    pub fn english() -> Self {
        Self {
            success_text: "has successfully completed".to_string(),
            grade_interstitial: "with {grade}".to_string(),
            disclaimer_text: "This {cert_label} does not confer academic credit and does not verify the identity of the learner.".to_string(),
            verify_text: "Authenticity of this {cert_label} can be verified at {verify_link}".to_string(),
        }
    }

    pub fn resolve(settings: &EngineSettings, config: &CourseConfig, locale: &str) -> Self {
        let mut phrases = Self::english();
        if let Some(defaults) = settings.default_translations.get(&settings.default_locale) {
            phrases.overlay(defaults);
        }
        if let Some(course) = config.translations.get(locale) {
            phrases.overlay(course);
        }
        phrases
    }

    fn overlay(&mut self, translation: &Translation) {
        let pick = |slot: &mut String, value: &Option<String>| {
            if let Some(value) = value {
                *slot = value.clone();
            }
        };
        pick(&mut self.success_text, &translation.success_text);
        pick(&mut self.grade_interstitial, &translation.grade_interstitial);
        pick(&mut self.disclaimer_text, &translation.disclaimer_text);
        pick(&mut self.verify_text, &translation.verify_text);
    }
}

/// Values available to `{placeholder}` substitution while drawing one document. Everything
/// user-supplied is already markup-escaped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderContext {
    pub date_string: String,
    pub student_name: String,
    pub successfully_completed: String,
    pub course_title: String,
    pub achievements_string: String,
    pub achievements_description_string: String,
    pub designation_tag: String,
    pub disclaimer_text: String,
    pub verify_text: String,
    pub verify_url: String,
    pub interstitial: String,
    pub credits_string: String,
    pub credential_tag: String,
    pub org_name: String,
    pub cert_label: String,
    pub extra: BTreeMap<String, String>,
}

impl RenderContext {
    pub fn get(&self, name: &str) -> Option<String> {
        let value = match name {
            "date_string" => &self.date_string,
            "student_name" => &self.student_name,
            "successfully_completed" => &self.successfully_completed,
            "course_title" => &self.course_title,
            "achievements_string" => &self.achievements_string,
            "achievements_description_string" => &self.achievements_description_string,
            "designation_tag" => &self.designation_tag,
            "disclaimer_text" => &self.disclaimer_text,
            "verify_text" => &self.verify_text,
            "verify_url" => &self.verify_url,
            "interstitial" => &self.interstitial,
            "credits_string" => &self.credits_string,
            "credential_tag" => &self.credential_tag,
            "org_name" => &self.org_name,
            "cert_label" => &self.cert_label,
            other => return self.extra.get(other).cloned(),
        };
        Some(value.clone())
    }

    pub fn substitute(&self, text: &str) -> Result<String, CertError> {
        template::substitute(text, |name| self.get(name), true)
    }
}

/// Inputs for the variant-neutral part of a [`RenderContext`].
pub struct ContextInputs<'a> {
    pub course_id: &'a str,
    pub config: &'a CourseConfig,
    pub settings: &'a EngineSettings,
    pub student: &'a Student,
    /// Empty when the document is not verified.
    pub verify_id: &'a str,
    pub today: NaiveDate,
}

/// Builds the values every layout shares; variant-specific achievement text is filled in
/// by the layout afterwards.
pub fn base_context(inputs: &ContextInputs<'_>) -> (RenderContext, Phrases) {
    let config = inputs.config;
    let settings = inputs.settings;
    let locale = config
        .locale
        .clone()
        .unwrap_or_else(|| settings.default_locale.clone());
    let phrases = Phrases::resolve(settings, config, &locale);

    let cert_label = config
        .certs_are_called
        .clone()
        .unwrap_or_else(|| settings.certs_are_called.clone());
    let course_title = config
        .long_course
        .clone()
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| config.course_short(inputs.course_id));
    let org_name = config
        .long_org
        .clone()
        .filter(|org| !org.is_empty())
        .unwrap_or_else(|| config.org_short(inputs.course_id));

    let lenient = |text: &str, pairs: &[(&str, &str)]| {
        template::substitute(
            text,
            |name| {
                pairs
                    .iter()
                    .find(|(key, _)| *key == name)
                    .map(|(_, value)| value.to_string())
            },
            false,
        )
        .unwrap_or_else(|_| text.to_string())
    };

    let disclaimer_text = if config.has_disclaimer {
        String::new()
    } else {
        lenient(&phrases.disclaimer_text, &[("cert_label", cert_label.as_str())])
    };

    let (verify_url, verify_text) = if inputs.verify_id.is_empty() {
        (String::new(), String::new())
    } else {
        let url = naming::verify_url(settings, inputs.verify_id);
        let link = format!("<a href='{url}'><b>{url}</b></a>");
        let text = lenient(
            &phrases.verify_text,
            &[("verify_link", link.as_str()), ("cert_label", cert_label.as_str())],
        );
        (url, text)
    };

    let grade = inputs.student.grade.as_deref();
    let context = RenderContext {
        date_string: cert_date(
            inputs.student.issue_date,
            &config.issued_date,
            &locale,
            inputs.today,
        ),
        student_name: markup::escape(&inputs.student.name),
        successfully_completed: phrases.success_text.clone(),
        course_title: markup::escape(&course_title),
        interstitial: interstitial_for(config, grade),
        disclaimer_text,
        verify_url,
        verify_text,
        org_name: markup::escape(&org_name),
        cert_label,
        ..RenderContext::default()
    };
    (context, phrases)
}

/// Interstitial text for a grade: the exact entry, else the `Pass` entry, else empty.
pub fn interstitial_for(config: &CourseConfig, grade: Option<&str>) -> String {
    grade
        .and_then(|grade| config.interstitial.get(grade))
        .or_else(|| config.interstitial.get("Pass"))
        .cloned()
        .unwrap_or_default()
}

/// Date printed on the document: an explicit request date wins, then today for rolling
/// courses, then the configured date. ISO dates are spelled out in the course locale.
pub fn cert_date(
    explicit: Option<NaiveDate>,
    policy: &IssueDatePolicy,
    locale: &str,
    today: NaiveDate,
) -> String {
    if let Some(date) = explicit {
        return format_date(date, locale);
    }
    match policy {
        IssueDatePolicy::Rolling => format_date(today, locale),
        IssueDatePolicy::Fixed(raw) => match NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
            Ok(date) => format_date(date, locale),
            Err(_) => raw.clone(),
        },
    }
}

pub fn format_date(date: NaiveDate, locale: &str) -> String {
    let locale = Locale::try_from(locale).unwrap_or_else(|_| {
        log::warn!("unknown locale '{locale}', formatting dates as {FALLBACK_LOCALE}");
        Locale::en_US
    });
    let midnight = Utc.from_utc_datetime(&date.and_time(NaiveTime::default()));
    midnight.format_localized(DATE_PATTERN, locale).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn explicit_date_wins_then_rolling_then_configured() {
        let today = ymd(2024, 3, 9);
        let fixed = IssueDatePolicy::Fixed("2012-02-02".to_string());
        assert_eq!(
            cert_date(Some(ymd(2020, 12, 25)), &fixed, "en_US", today),
            "December 25, 2020"
        );
        assert_eq!(
            cert_date(None, &IssueDatePolicy::Rolling, "en_US", today),
            "March 9, 2024"
        );
        assert_eq!(cert_date(None, &fixed, "en_US", today), "February 2, 2012");
        let verbatim = IssueDatePolicy::Fixed("Jan. 1st, 1970".to_string());
        assert_eq!(cert_date(None, &verbatim, "en_US", today), "Jan. 1st, 1970");
    }

    #[test]
    fn dates_follow_the_locale() {
        assert_eq!(format_date(ymd(2024, 3, 9), "fr_FR"), "mars 9, 2024");
        assert_eq!(format_date(ymd(2024, 3, 9), "xx_NOPE"), "March 9, 2024");
    }

    #[test]
    fn interstitial_falls_back_to_pass() {
        let mut config = CourseConfig::default();
        config
            .interstitial
            .insert("Pass".to_string(), "for passing".to_string());
        config
            .interstitial
            .insert("Distinction".to_string(), "with excellence".to_string());
        assert_eq!(interstitial_for(&config, Some("Distinction")), "with excellence");
        assert_eq!(interstitial_for(&config, Some("B+")), "for passing");
        assert_eq!(interstitial_for(&config, None), "for passing");
        assert_eq!(interstitial_for(&CourseConfig::default(), Some("A")), "");
    }

    #[test]
    fn base_context_escapes_names_and_builds_verify_link() {
        let mut config = CourseConfig::default();
        config.long_course = Some("Rust & Friends".to_string());
        let settings = EngineSettings {
            verify_url: "https://v.example/".to_string(),
            ..EngineSettings::default()
        };
        let student = Student::new("Ann <Admin>");
        let (ctx, phrases) = base_context(&ContextInputs {
            course_id: "course-v1:Org+R101+2024",
            config: &config,
            settings: &settings,
            student: &student,
            verify_id: "abc123",
            today: ymd(2024, 1, 1),
        });
        assert_eq!(ctx.student_name, "Ann &lt;Admin&gt;");
        assert_eq!(ctx.course_title, "Rust &amp; Friends");
        assert_eq!(ctx.org_name, "Org");
        assert_eq!(ctx.verify_url, "https://v.example/cert/abc123");
        assert!(ctx.verify_text.starts_with("Authenticity of this certificate"));
        assert!(ctx
            .verify_text
            .contains("<a href='https://v.example/cert/abc123'><b>https://v.example/cert/abc123</b></a>"));
        assert_eq!(phrases.success_text, ctx.successfully_completed);
        assert!(!ctx.disclaimer_text.is_empty());
    }

    #[test]
    fn unverified_documents_have_no_verify_text() {
        let config = CourseConfig {
            has_disclaimer: true,
            ..CourseConfig::default()
        };
        let settings = EngineSettings::default();
        let student = Student::new("Bo");
        let (ctx, _) = base_context(&ContextInputs {
            course_id: "Org/C/R",
            config: &config,
            settings: &settings,
            student: &student,
            verify_id: "",
            today: ymd(2024, 1, 1),
        });
        assert!(ctx.verify_text.is_empty());
        assert!(ctx.verify_url.is_empty());
        assert!(ctx.disclaimer_text.is_empty());
    }

    #[test]
    fn course_translations_override_defaults() {
        let mut config = CourseConfig::default();
        config.translations.insert(
            "es_ES".to_string(),
            Translation {
                success_text: Some("ha completado con éxito".to_string()),
                ..Translation::default()
            },
        );
        let phrases = Phrases::resolve(&EngineSettings::default(), &config, "es_ES");
        assert_eq!(phrases.success_text, "ha completado con éxito");
        assert_eq!(phrases.grade_interstitial, Phrases::english().grade_interstitial);
    }

    #[test]
    fn context_lookup_covers_extra_values() {
        let mut ctx = RenderContext {
            student_name: "Ada".to_string(),
            ..RenderContext::default()
        };
        ctx.extra.insert("cohort".to_string(), "2024".to_string());
        assert_eq!(
            ctx.substitute("{student_name} / {cohort}").expect("ok"),
            "Ada / 2024"
        );
        assert!(ctx.substitute("{missing}").is_err());
    }
}
