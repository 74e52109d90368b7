//! Template versions and the layout each one draws.
//!
//! The data-driven layout reads its steps from course configuration. The fixed legacy
//! layouts are the same step lists written in code, drawn by the same interpreter.

use crate::config::{CourseConfig, EngineSettings, FontConfig, TemplatePdf};
use crate::context::{Phrases, RenderContext};
use crate::error::CertError;
use crate::interpreter::{Anchor, Stage};
use crate::markup;
use crate::style::Alignment;
use crate::template;
use crate::theme::{FlairPosition, TextAttrs, ThemeStep};
use crate::types::{PageGeometry, Pt};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateVersion {
    Programmatic,
    Stanford,
    Cme,
    Letterhead,
}

impl TemplateVersion {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim() {
            "4_programmatic" => Some(TemplateVersion::Programmatic),
            "stanford" => Some(TemplateVersion::Stanford),
            "cme" => Some(TemplateVersion::Cme),
            "letterhead" => Some(TemplateVersion::Letterhead),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateVersion::Programmatic => "4_programmatic",
            TemplateVersion::Stanford => "stanford",
            TemplateVersion::Cme => "cme",
            TemplateVersion::Letterhead => "letterhead",
        }
    }

    /// Embedded verification page set used when the template directory has none.
    pub fn page_set(&self) -> &'static str {
        match self {
            TemplateVersion::Programmatic => certstamp_pages::PROGRAMMATIC_PAGE_SET_ID,
            _ => certstamp_pages::CLASSIC_PAGE_SET_ID,
        }
    }

    pub fn can_verify(&self) -> bool {
        !matches!(self, TemplateVersion::Letterhead)
    }

    fn default_geometry(&self) -> PageGeometry {
        match self {
            TemplateVersion::Programmatic | TemplateVersion::Stanford => PageGeometry::LandscapeA4,
            TemplateVersion::Cme => PageGeometry::LandscapeLetter,
            TemplateVersion::Letterhead => PageGeometry::PortraitLetter,
        }
    }
}

/// Version of a course, or `UnknownTemplateVersion`.
pub fn dispatch(course_id: &str, config: &CourseConfig) -> Result<TemplateVersion, CertError> {
    TemplateVersion::parse(&config.version).ok_or_else(|| {
        let err = CertError::UnknownTemplateVersion {
            course_id: course_id.to_string(),
            version: config.version.clone(),
        };
        log::error!("{err}");
        err
    })
}

/// Everything needed to draw and place one document.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub version: TemplateVersion,
    pub geometry: PageGeometry,
    pub filename: String,
    /// Institution template composited under the overlay.
    pub template: Option<PathBuf>,
    /// `verified` or `honor`.
    pub certificate_type: &'static str,
    pub stages: Vec<Stage>,
}

pub fn layout_for(
    version: TemplateVersion,
    course_id: &str,
    config: &CourseConfig,
    settings: &EngineSettings,
) -> Result<Layout, CertError> {
    let geometry = match version {
        TemplateVersion::Programmatic => config
            .page_geometry(course_id)?
            .unwrap_or_else(|| version.default_geometry()),
        _ => version.default_geometry(),
    };
    let filename = match version {
        TemplateVersion::Letterhead => "distinction-letter.pdf".to_string(),
        _ => settings.filename.clone(),
    };
    let certificate_type = match &config.template_file {
        TemplatePdf::Named(name) if name.contains("verified") => "verified",
        _ => "honor",
    };
    let stages = match version {
        TemplateVersion::Programmatic => programmatic_stages(config),
        TemplateVersion::Stanford => stanford_stages(config),
        TemplateVersion::Cme => cme_stages(config),
        TemplateVersion::Letterhead => letterhead_stages(config),
    };
    Ok(Layout {
        version,
        geometry,
        filename,
        template: template_path(version, course_id, config, settings),
        certificate_type,
        stages,
    })
}

/// `{template_dir}/v{version}-cert-templates/{file}`. The data-driven layout composites a
/// template only when one is named; legacy layouts default to
/// `certificate-template-{org}-{course}.pdf`.
pub fn template_path(
    version: TemplateVersion,
    course_id: &str,
    config: &CourseConfig,
    settings: &EngineSettings,
) -> Option<PathBuf> {
    let prefix = settings
        .template_dir
        .join(format!("v{}-cert-templates", config.version));
    match (&config.template_file, version) {
        (TemplatePdf::Disabled, _) => None,
        (TemplatePdf::Named(name), _) => Some(prefix.join(name)),
        (TemplatePdf::Default, TemplateVersion::Programmatic) => None,
        (TemplatePdf::Default, _) => Some(prefix.join(format!(
            "certificate-template-{}-{}.pdf",
            config.org_short(course_id),
            config.course_short(course_id)
        ))),
    }
}

/// Fills the achievement, designation and credential values each version derives from the
/// grade and designation.
pub fn apply_variant(
    version: TemplateVersion,
    config: &CourseConfig,
    course_id: &str,
    grade: Option<&str>,
    designation: Option<&str>,
    phrases: &Phrases,
    ctx: &mut RenderContext,
) -> Result<(), CertError> {
    match version {
        TemplateVersion::Programmatic => {
            programmatic_variant(config, course_id, grade, designation, phrases, ctx)
        }
        TemplateVersion::Stanford => {
            ctx.interstitial = stanford_interstitial(config, grade);
            Ok(())
        }
        TemplateVersion::Cme => {
            cme_variant(config, designation, ctx);
            Ok(())
        }
        TemplateVersion::Letterhead => Ok(()),
    }
}

fn programmatic_variant(
    config: &CourseConfig,
    course_id: &str,
    grade: Option<&str>,
    designation: Option<&str>,
    phrases: &Phrases,
    ctx: &mut RenderContext,
) -> Result<(), CertError> {
    ctx.achievements_description_string = ctx.interstitial.clone();
    if let Some(grade) = grade.filter(|g| !g.is_empty() && !g.eq_ignore_ascii_case("pass")) {
        let grade_html = format!("<b>{}</b>", markup::escape(grade));
        let line = template::substitute(
            &phrases.grade_interstitial,
            |name| (name == "grade").then(|| grade_html.clone()),
            false,
        )?;
        ctx.achievements_string = format!("{line}<br /><br />");
    }

    let Some(designation) = designation else {
        return Ok(());
    };
    let matched = config
        .designations
        .iter()
        .find(|(_, block)| block.titles.iter().any(|title| title == designation));
    if let Some((tag, block)) = matched {
        if designation != "Other" && designation != "None" {
            ctx.student_name = format!("{}, {}", ctx.student_name, markup::escape(designation));
        }
        let credits = config.credits.clone().ok_or_else(|| {
            let err = CertError::missing_key(course_id, "CREDITS");
            log::error!("{err}");
            err
        })?;
        ctx.achievements_string = block.credits.clone();
        ctx.achievements_description_string = credits;
        ctx.designation_tag = tag.clone();
    }
    Ok(())
}

/// Bold interstitial padded with spaces for an exactly matching grade, else a single space.
fn stanford_interstitial(config: &CourseConfig, grade: Option<&str>) -> String {
    grade
        .and_then(|grade| config.interstitial.get(grade))
        .filter(|text| !text.trim().is_empty())
        .map(|text| format!(" <b>{text}</b> "))
        .unwrap_or_else(|| " ".to_string())
}

fn cme_variant(config: &CourseConfig, designation: Option<&str>, ctx: &mut RenderContext) {
    let physician = designation
        .map(|d| d.eq_ignore_ascii_case("MD") || d.eq_ignore_ascii_case("DO"))
        .unwrap_or(false);
    ctx.credential_tag = if physician { "MD/DO" } else { "AHP" }.to_string();
    ctx.credits_string = match config.credits.as_deref().filter(|c| !c.is_empty()) {
        Some(credits) if physician => format!("and is awarded {credits}"),
        Some(credits) => format!("The activity was designated for {credits}"),
        None => String::new(),
    };
}

fn programmatic_stages(config: &CourseConfig) -> Vec<Stage> {
    let flair = |position: FlairPosition| -> Vec<ThemeStep> {
        config
            .flair
            .iter()
            .filter(|block| block.position == position)
            .flat_map(|block| block.template.iter().cloned())
            .collect()
    };

    let mut stages = vec![
        Stage::new("certificate_theme", config.certificate_theme.clone()),
        Stage::new("flair:bottom", flair(FlairPosition::Bottom)).substituted(),
    ];
    for (idx, entry) in config.instructors.iter().enumerate() {
        for block in entry.blocks() {
            let fields: BTreeMap<String, String> = block
                .fields
                .keys()
                .filter_map(|key| block.field(key).map(|value| (key.clone(), value)))
                .collect();
            stages.push(
                Stage::new(format!("instructor:{idx}"), block.template.clone()).anchored(
                    Anchor {
                        x: block.x,
                        y: block.y,
                        signature_y_offset: block.signature_y_offset,
                        fields,
                    },
                ),
            );
        }
    }
    stages.push(
        Stage::new("course_information", config.course_information.clone()).substituted(),
    );
    stages.push(Stage::new("flair:top", flair(FlairPosition::Top)).substituted());
    stages
}

struct TextSpec {
    string: &'static str,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    font_size: f32,
    leading: f32,
    alignment: Alignment,
    auto_scale: bool,
    font: Option<(&'static str, &'static str)>,
}

impl TextSpec {
    fn step(self, color: &str) -> ThemeStep {
        ThemeStep::Text(TextAttrs {
            string: Some(self.string.to_string()),
            key: None,
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
            font_size: Some(self.font_size),
            leading: Some(self.leading),
            text_color: Some(color.to_string()),
            alignment: self.alignment,
            auto_scale: self.auto_scale,
            font: self.font.map(|(name, face_type)| FontConfig {
                name: name.to_string(),
                face_type: face_type.to_string(),
            }),
        })
    }
}

fn mm(value: f32) -> f32 {
    Pt::from_mm(value).to_f32()
}

const STANFORD_GRAY: &str = "#4D4E51";

/// Statement of accomplishment on landscape A4. Boxes are one leading tall so each line
/// sits where its baseline was designed; the name shrinks to fit its 153mm column.
fn stanford_stages(config: &CourseConfig) -> Vec<Stage> {
    let color = config.color.as_deref().unwrap_or(STANFORD_GRAY);
    let page_width = PageGeometry::LandscapeA4.size().width.to_f32();
    let left = mm(55.0);
    let date_right = page_width - mm(45.0);
    let steps = vec![
        TextSpec {
            string: "<i><b>{date_string}</b></i>",
            x: left,
            y: mm(159.0),
            width: date_right - left,
            height: 10.0,
            font_size: 12.0,
            leading: 10.0,
            alignment: Alignment::Right,
            auto_scale: false,
            font: Some(("SourceSansPro", "Light")),
        }
        .step(color),
        TextSpec {
            string: "This is to certify that,",
            x: left,
            y: mm(135.0),
            width: page_width - left,
            height: 10.0,
            font_size: 14.0,
            leading: 10.0,
            alignment: Alignment::Left,
            auto_scale: false,
            font: Some(("SourceSansPro", "Regular")),
        }
        .step(color),
        TextSpec {
            string: "<b>{student_name}</b>",
            x: left,
            y: mm(124.5),
            width: mm(153.0),
            height: 34.0,
            font_size: 34.0,
            leading: 34.0,
            alignment: Alignment::Left,
            auto_scale: true,
            font: None,
        }
        .step(color),
        TextSpec {
            string: "has successfully completed{interstitial}a free online offering of",
            x: left,
            y: mm(104.5),
            width: page_width - left,
            height: 10.0,
            font_size: 14.0,
            leading: 10.0,
            alignment: Alignment::Left,
            auto_scale: false,
            font: Some(("SourceSansPro", "Regular")),
        }
        .step(color),
        TextSpec {
            string: "{verify_text}",
            x: 0.0,
            y: mm(31.0),
            width: page_width,
            height: 10.0,
            font_size: 9.0,
            leading: 10.0,
            alignment: Alignment::Center,
            auto_scale: false,
            font: Some(("SourceSansPro", "Regular")),
        }
        .step(color),
    ];
    vec![Stage::new("stanford", steps).substituted()]
}

const CME_MARGIN: f32 = 58.0;
const CME_TEXT_WIDTH: f32 = 676.0;

/// Continuing medical education certificate on landscape letter.
fn cme_stages(config: &CourseConfig) -> Vec<Stage> {
    let color = config.color.as_deref().unwrap_or("#000000");
    let page = PageGeometry::LandscapeLetter.size();
    let (page_width, page_height) = (page.width.to_f32(), page.height.to_f32());
    let steps = vec![
        TextSpec {
            string: "{date_string}",
            x: page_width - CME_MARGIN - 200.0,
            y: page_height - CME_MARGIN - 18.0 - 13.0,
            width: 200.0,
            height: 24.0,
            font_size: 18.0,
            leading: 24.0,
            alignment: Alignment::Right,
            auto_scale: false,
            font: None,
        }
        .step(color),
        TextSpec {
            string: "<b>{student_name}</b>",
            x: CME_MARGIN,
            y: 370.0,
            width: CME_TEXT_WIDTH,
            height: 54.0,
            font_size: 36.0,
            leading: 54.0,
            alignment: Alignment::Left,
            auto_scale: true,
            font: None,
        }
        .step(color),
        TextSpec {
            string: "<b>{course_title}</b>",
            x: CME_MARGIN,
            y: 210.0,
            width: CME_TEXT_WIDTH,
            height: 105.6,
            font_size: 32.0,
            leading: 41.6,
            alignment: Alignment::Left,
            auto_scale: true,
            font: None,
        }
        .step(color),
        TextSpec {
            string: "{credits_string}",
            x: CME_MARGIN,
            y: 175.0,
            width: CME_TEXT_WIDTH,
            height: 24.0,
            font_size: 18.0,
            leading: 24.0,
            alignment: Alignment::Left,
            auto_scale: false,
            font: None,
        }
        .step(color),
        TextSpec {
            string: "{credential_tag}",
            x: CME_TEXT_WIDTH + CME_MARGIN - 50.0,
            y: 53.0,
            width: 50.0,
            height: 12.0,
            font_size: 10.0,
            leading: 12.0,
            alignment: Alignment::Right,
            auto_scale: false,
            font: None,
        }
        .step(color),
    ];
    vec![Stage::new("cme", steps).substituted()]
}

/// Distinction letter on portrait letter paper.
fn letterhead_stages(config: &CourseConfig) -> Vec<Stage> {
    let color = config.color.as_deref().unwrap_or("#000000");
    let page_width = PageGeometry::PortraitLetter.size().width.to_f32();
    let margin = 72.0;
    let text_width = page_width - 2.0 * margin;
    let steps = vec![
        TextSpec {
            string: "{date_string}",
            x: margin,
            y: 640.0,
            width: text_width,
            height: 14.0,
            font_size: 12.0,
            leading: 14.0,
            alignment: Alignment::Right,
            auto_scale: false,
            font: None,
        }
        .step(color),
        TextSpec {
            string: "Dear <b>{student_name}</b>,",
            x: margin,
            y: 580.0,
            width: text_width,
            height: 24.0,
            font_size: 16.0,
            leading: 20.0,
            alignment: Alignment::Left,
            auto_scale: true,
            font: None,
        }
        .step(color),
        TextSpec {
            string: "On behalf of {org_name}, congratulations on completing <b>{course_title}</b> with distinction.",
            x: margin,
            y: 480.0,
            width: text_width,
            height: 80.0,
            font_size: 13.0,
            leading: 18.0,
            alignment: Alignment::Left,
            auto_scale: false,
            font: None,
        }
        .step(color),
    ];
    vec![Stage::new("letterhead", steps).substituted()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CourseCatalog, Designation};

    fn phrases() -> Phrases {
        Phrases::english()
    }

    fn ctx_with_interstitial(config: &CourseConfig, grade: Option<&str>) -> RenderContext {
        RenderContext {
            student_name: "Ada".to_string(),
            interstitial: crate::context::interstitial_for(config, grade),
            ..RenderContext::default()
        }
    }

    fn designated_config() -> CourseConfig {
        let mut config = CourseConfig::default();
        config.designations.insert(
            "physician".to_string(),
            Designation {
                titles: vec!["MD".to_string(), "DO".to_string(), "Other".to_string()],
                credits: "20 credits".to_string(),
            },
        );
        config.credits = Some("AMA PRA Category 1".to_string());
        config
    }

    #[test]
    fn unknown_versions_are_rejected() {
        let config = CourseConfig {
            version: "v9".to_string(),
            ..CourseConfig::default()
        };
        let err = dispatch("Org/C/R", &config).expect_err("unknown");
        assert!(matches!(err, CertError::UnknownTemplateVersion { version, .. } if version == "v9"));
        assert_eq!(
            dispatch("Org/C/R", &CourseConfig::default()).expect("default"),
            TemplateVersion::Programmatic
        );
    }

    #[test]
    fn programmatic_grade_drives_achievements_unless_pass() {
        let mut config = CourseConfig::default();
        config
            .interstitial
            .insert("Pass".to_string(), "for passing".to_string());
        let mut ctx = ctx_with_interstitial(&config, Some("A"));
        apply_variant(
            TemplateVersion::Programmatic,
            &config,
            "Org/C/R",
            Some("A"),
            None,
            &phrases(),
            &mut ctx,
        )
        .expect("variant");
        assert_eq!(ctx.achievements_string, "with <b>A</b><br /><br />");
        assert_eq!(ctx.achievements_description_string, "for passing");

        let mut ctx = ctx_with_interstitial(&config, Some("pass"));
        apply_variant(
            TemplateVersion::Programmatic,
            &config,
            "Org/C/R",
            Some("pass"),
            None,
            &phrases(),
            &mut ctx,
        )
        .expect("variant");
        assert!(ctx.achievements_string.is_empty());
    }

    #[test]
    fn programmatic_designation_replaces_achievements() {
        let config = designated_config();
        let mut ctx = ctx_with_interstitial(&config, Some("A"));
        apply_variant(
            TemplateVersion::Programmatic,
            &config,
            "Org/C/R",
            Some("A"),
            Some("MD"),
            &phrases(),
            &mut ctx,
        )
        .expect("variant");
        assert_eq!(ctx.student_name, "Ada, MD");
        assert_eq!(ctx.achievements_string, "20 credits");
        assert_eq!(ctx.achievements_description_string, "AMA PRA Category 1");
        assert_eq!(ctx.designation_tag, "physician");

        let mut ctx = ctx_with_interstitial(&config, None);
        apply_variant(
            TemplateVersion::Programmatic,
            &config,
            "Org/C/R",
            None,
            Some("Other"),
            &phrases(),
            &mut ctx,
        )
        .expect("variant");
        assert_eq!(ctx.student_name, "Ada");
        assert_eq!(ctx.designation_tag, "physician");
    }

    #[test]
    fn programmatic_designation_requires_credits() {
        let mut config = designated_config();
        config.credits = None;
        let mut ctx = RenderContext::default();
        let err = apply_variant(
            TemplateVersion::Programmatic,
            &config,
            "Org/C/R",
            None,
            Some("DO"),
            &phrases(),
            &mut ctx,
        )
        .expect_err("credits required");
        assert!(matches!(err, CertError::MissingConfigKey { key, .. } if key == "CREDITS"));
    }

    #[test]
    fn stanford_honors_grade_and_ignores_designation() {
        let mut config = designated_config();
        config
            .interstitial
            .insert("Distinction".to_string(), "with Distinction".to_string());
        let mut ctx = ctx_with_interstitial(&config, Some("Distinction"));
        apply_variant(
            TemplateVersion::Stanford,
            &config,
            "Org/C/R",
            Some("Distinction"),
            Some("MD"),
            &phrases(),
            &mut ctx,
        )
        .expect("variant");
        assert_eq!(ctx.interstitial, " <b>with Distinction</b> ");
        assert_eq!(ctx.student_name, "Ada");
        assert!(ctx.designation_tag.is_empty());

        let mut ctx = RenderContext::default();
        apply_variant(
            TemplateVersion::Stanford,
            &config,
            "Org/C/R",
            Some("B"),
            None,
            &phrases(),
            &mut ctx,
        )
        .expect("variant");
        assert_eq!(ctx.interstitial, " ");
    }

    #[test]
    fn cme_designation_selects_credit_text() {
        let config = designated_config();
        let mut ctx = RenderContext::default();
        apply_variant(
            TemplateVersion::Cme,
            &config,
            "Org/C/R",
            Some("A"),
            Some("md"),
            &phrases(),
            &mut ctx,
        )
        .expect("variant");
        assert_eq!(ctx.credential_tag, "MD/DO");
        assert_eq!(ctx.credits_string, "and is awarded AMA PRA Category 1");
        assert!(ctx.achievements_string.is_empty());

        for designation in [Some("RN"), None] {
            let mut ctx = RenderContext::default();
            apply_variant(
                TemplateVersion::Cme,
                &config,
                "Org/C/R",
                None,
                designation,
                &phrases(),
                &mut ctx,
            )
            .expect("variant");
            assert_eq!(ctx.credential_tag, "AHP");
            assert_eq!(
                ctx.credits_string,
                "The activity was designated for AMA PRA Category 1"
            );
        }
    }

    #[test]
    fn letterhead_ignores_grade_and_never_verifies() {
        let config = designated_config();
        let mut ctx = ctx_with_interstitial(&config, Some("A"));
        let before = ctx.clone();
        apply_variant(
            TemplateVersion::Letterhead,
            &config,
            "Org/C/R",
            Some("A"),
            Some("MD"),
            &phrases(),
            &mut ctx,
        )
        .expect("variant");
        assert_eq!(ctx, before);
        assert!(!TemplateVersion::Letterhead.can_verify());
        let layout = layout_for(
            TemplateVersion::Letterhead,
            "Org/C/R",
            &config,
            &EngineSettings::default(),
        )
        .expect("layout");
        assert_eq!(layout.filename, "distinction-letter.pdf");
        assert_eq!(layout.geometry, PageGeometry::PortraitLetter);
    }

    #[test]
    fn template_paths_follow_version_and_configuration() {
        let settings = EngineSettings {
            template_dir: PathBuf::from("/t"),
            ..EngineSettings::default()
        };
        let mut config = CourseConfig {
            version: "stanford".to_string(),
            ..CourseConfig::default()
        };
        assert_eq!(
            template_path(TemplateVersion::Stanford, "Org/CS101/2020", &config, &settings),
            Some(PathBuf::from(
                "/t/vstanford-cert-templates/certificate-template-Org-CS101.pdf"
            ))
        );
        config.template_file = TemplatePdf::Disabled;
        assert_eq!(
            template_path(TemplateVersion::Stanford, "Org/CS101/2020", &config, &settings),
            None
        );
        let programmatic = CourseConfig::default();
        assert_eq!(
            template_path(TemplateVersion::Programmatic, "Org/C/R", &programmatic, &settings),
            None
        );
        let named = CourseConfig {
            template_file: TemplatePdf::Named("verified-demo.pdf".to_string()),
            ..CourseConfig::default()
        };
        let layout = layout_for(TemplateVersion::Programmatic, "Org/C/R", &named, &settings)
            .expect("layout");
        assert_eq!(
            layout.template,
            Some(PathBuf::from("/t/v4_programmatic-cert-templates/verified-demo.pdf"))
        );
        assert_eq!(layout.certificate_type, "verified");
    }

    #[test]
    fn programmatic_stage_order_is_fixed() {
        let raw = r#"{
            "c": {
                "certificate_theme": [{"rectangle": {"x": 0, "y": 0, "width": 1, "height": 1}}],
                "flair": [
                    {"position": "top", "template": [{"text": {"string": "top", "width": 10, "height": 10}}]},
                    {"position": "bottom", "template": [{"text": {"string": "bottom", "width": 10, "height": 10}}]}
                ],
                "instructors": [{"lead": {"x": 1, "y": 2, "name": "Ada", "template": []}}],
                "course_information": []
            }
        }"#;
        let catalog = CourseCatalog::from_json(raw).expect("catalog");
        let config = catalog.get("c").expect("course");
        let layout = layout_for(
            TemplateVersion::Programmatic,
            "c",
            config,
            &EngineSettings::default(),
        )
        .expect("layout");
        let names: Vec<&str> = layout.stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "certificate_theme",
                "flair:bottom",
                "instructor:0",
                "course_information",
                "flair:top"
            ]
        );
        assert!(!layout.stages[0].substitute);
        assert!(layout.stages[3].substitute);
        let anchor = layout.stages[2].anchor.as_ref().expect("anchored");
        assert_eq!(anchor.fields.get("name").map(String::as_str), Some("Ada"));
        assert_eq!(layout.geometry, PageGeometry::LandscapeA4);
    }

    #[test]
    fn configured_page_geometry_applies_to_programmatic_only() {
        let config = CourseConfig {
            page: Some("portrait-A4".to_string()),
            ..CourseConfig::default()
        };
        let settings = EngineSettings::default();
        let layout =
            layout_for(TemplateVersion::Programmatic, "a/b/c", &config, &settings).expect("layout");
        assert_eq!(layout.geometry, PageGeometry::PortraitA4);
        let layout = layout_for(TemplateVersion::Cme, "a/b/c", &config, &settings).expect("layout");
        assert_eq!(layout.geometry, PageGeometry::LandscapeLetter);
        let bad = CourseConfig {
            page: Some("tabloid".to_string()),
            ..CourseConfig::default()
        };
        assert!(layout_for(TemplateVersion::Programmatic, "a/b/c", &bad, &settings).is_err());
    }
}
