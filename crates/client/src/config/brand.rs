use serde::Deserialize;

/// Raw brand overrides. Anything left unset falls back to the AliranTunai
/// defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BrandSettings {
    pub app_name: Option<String>,
    pub primary_color: Option<String>,
    pub secondary_color: Option<String>,
    pub accent_color: Option<String>,
    pub background_color: Option<String>,
    pub text_color: Option<String>,
    pub logo_path: Option<String>,
    pub favicon_path: Option<String>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub meta_keywords: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Brand {
    pub app_name: String,
    pub primary_color: String,
    pub secondary_color: String,
    pub accent_color: String,
    pub background_color: String,
    pub text_color: String,
    pub logo_path: String,
    pub favicon_path: String,
    pub meta_title: String,
    pub meta_description: String,
    pub meta_keywords: String,
}

/// Values destined for the document head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadMeta {
    pub title: String,
    pub favicon: String,
    pub description: String,
    pub keywords: String,
}

fn or_default(value: &Option<String>, fallback: &str) -> String {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

impl Brand {
    pub fn resolve(settings: &BrandSettings) -> Self {
        let app_name = or_default(&settings.app_name, "AliranTunai");
        let meta_title = settings
            .meta_title
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{app_name} | Cash Flow Dashboard"));

        Self {
            primary_color: or_default(&settings.primary_color, "#0F766E"),
            secondary_color: or_default(&settings.secondary_color, "#134E4A"),
            accent_color: or_default(&settings.accent_color, "#F59E0B"),
            background_color: or_default(&settings.background_color, "#F8FAFC"),
            text_color: or_default(&settings.text_color, "#0F172A"),
            logo_path: or_default(&settings.logo_path, "/logo.svg"),
            favicon_path: or_default(&settings.favicon_path, "/favicon.ico"),
            meta_description: or_default(
                &settings.meta_description,
                "Track sales, purchases and your cash conversion cycle from WhatsApp.",
            ),
            meta_keywords: or_default(
                &settings.meta_keywords,
                "cash flow, small business, bookkeeping, whatsapp, malaysia",
            ),
            meta_title,
            app_name,
        }
    }

    /// Custom properties for the document root, in a stable order.
    pub fn css_custom_properties(&self) -> Vec<(&'static str, String)> {
        vec![
            ("--color-primary", self.primary_color.clone()),
            ("--color-secondary", self.secondary_color.clone()),
            ("--color-accent", self.accent_color.clone()),
            ("--color-background", self.background_color.clone()),
            ("--color-text", self.text_color.clone()),
            ("--brand-logo", format!("url(\"{}\")", self.logo_path)),
        ]
    }

    pub fn head(&self) -> HeadMeta {
        HeadMeta {
            title: self.meta_title.clone(),
            favicon: self.favicon_path.clone(),
            description: self.meta_description.clone(),
            keywords: self.meta_keywords.clone(),
        }
    }
}
