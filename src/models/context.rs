use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Dashboard page hosting a chat surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Page {
    Homepage,
    #[default]
    Dashboard,
    BookBrief,
    MarketingPlan,
    OrganicPosts,
    PaidPosts,
    FacebookSetup,
    ManageAds,
    Help,
}

impl Page {
    pub fn as_str(&self) -> &'static str {
        match self {
            Page::Homepage => "homepage",
            Page::Dashboard => "dashboard",
            Page::BookBrief => "book-brief",
            Page::MarketingPlan => "marketing-plan",
            Page::OrganicPosts => "organic-posts",
            Page::PaidPosts => "paid-posts",
            Page::FacebookSetup => "facebook-setup",
            Page::ManageAds => "manage-ads",
            Page::Help => "help",
        }
    }

    /// Greeting shown above an empty transcript. View only, never persisted.
    pub fn greeting(&self) -> &'static str {
        match self {
            Page::BookBrief => {
                "Hello! I can help you create a comprehensive book brief. What would you like to know?"
            }
            Page::MarketingPlan => {
                "Hi! I can assist you with your marketing plan. Feel free to ask any questions!"
            }
            Page::OrganicPosts => "Welcome! Need help creating engaging organic posts for your book?",
            Page::PaidPosts => "Hello! I can guide you through creating effective Facebook paid ads.",
            Page::FacebookSetup => "Hi! Let me help you set up your Facebook advertising account.",
            Page::ManageAds => "Welcome! I can help you optimize and manage your ad campaigns.",
            Page::Dashboard => "Hello! How can I help you with your book marketing today?",
            Page::Homepage | Page::Help => "Hello! How can I assist you with your book marketing?",
        }
    }
}

/// Everything a chat surface knows about where it is mounted. Passed in at
/// construction and never shared between surfaces.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    user_id: Option<String>,
    conversation_id: Option<String>,
    marketing_plan_id: Option<String>,
    page: Option<Page>,
    book_brief: Option<Value>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into()).filter(|s: &String| !s.trim().is_empty());
        self
    }

    pub fn with_conversation_id(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into()).filter(|s: &String| !s.is_empty());
        self
    }

    pub fn with_marketing_plan_id(mut self, marketing_plan_id: impl Into<String>) -> Self {
        self.marketing_plan_id = Some(marketing_plan_id.into()).filter(|s: &String| !s.is_empty());
        self
    }

    pub fn with_page(mut self, page: Page) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_book_brief(mut self, book_brief: Value) -> Self {
        self.book_brief = Some(book_brief);
        self
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn marketing_plan_id(&self) -> Option<&str> {
        self.marketing_plan_id.as_deref()
    }

    pub fn page(&self) -> Page {
        self.page.unwrap_or_default()
    }

    pub fn book_brief(&self) -> Option<&Value> {
        self.book_brief.as_ref()
    }

    /// Context object forwarded to the webhook with every exchange.
    pub fn to_payload(&self) -> Map<String, Value> {
        let mut payload = Map::new();
        if let Some(plan_id) = &self.marketing_plan_id {
            payload.insert("marketingPlanId".into(), Value::String(plan_id.clone()));
        }
        if let Some(page) = self.page {
            payload.insert("currentPage".into(), Value::String(page.as_str().into()));
        }
        if let Some(brief) = &self.book_brief {
            payload.insert("bookBrief".into(), brief.clone());
        }
        payload
    }
}
