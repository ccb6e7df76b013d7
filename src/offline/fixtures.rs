//! Bundled seed data
//!
//! Content shipped with the app so the storefront has something to show
//! before any network call succeeds.

use crate::domain::catalog::{Category, Product};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Key of the Arabic UI strings
pub const ARABIC_LOCALIZATION_KEY: &str = "arabic_localization";
/// Key of the English UI strings
pub const ENGLISH_LOCALIZATION_KEY: &str = "english_localization";

/// A spoken phrase and the app action it triggers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoicePattern {
    pub pattern: String,
    pub action: String,
}

/// Voice patterns grouped by screen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceCommandTable {
    pub navigation: Vec<VoicePattern>,
    pub cart: Vec<VoicePattern>,
    pub search: Vec<VoicePattern>,
}

impl VoiceCommandTable {
    /// Action for an exact phrase match
    pub fn resolve(&self, phrase: &str) -> Option<&str> {
        let phrase = phrase.trim();
        self.navigation
            .iter()
            .chain(&self.cart)
            .chain(&self.search)
            .find(|p| p.pattern == phrase)
            .map(|p| p.action.as_str())
    }
}

fn patterns(rows: &[(&str, &str)]) -> Vec<VoicePattern> {
    rows.iter()
        .map(|(pattern, action)| VoicePattern {
            pattern: pattern.to_string(),
            action: action.to_string(),
        })
        .collect()
}

pub fn voice_commands() -> VoiceCommandTable {
    VoiceCommandTable {
        navigation: patterns(&[
            ("اذهب إلى الرئيسية", "navigate_home"),
            ("اذهب إلى السلة", "navigate_cart"),
            ("اذهب إلى الملف الشخصي", "navigate_profile"),
        ]),
        cart: patterns(&[
            ("أضف إلى السلة", "add_to_cart"),
            ("أكمل الشراء", "checkout"),
        ]),
        search: patterns(&[
            ("ابحث عن", "search"),
            ("تمر", "search_dates"),
            ("فواكه", "search_fruits"),
        ]),
    }
}

pub fn arabic_localization() -> Value {
    json!({
        "interface": {
            "home": "الرئيسية",
            "cart": "سلة التسوق",
            "categories": "الفئات",
            "profile": "ملف التعريف",
            "search": "بحث"
        },
        "products": {
            "addToCart": "أضف إلى السلة",
            "removeFromCart": "أحذف من السلة",
            "inStock": "متوفر",
            "outOfStock": "غير متوفر"
        },
        "accessibility": {
            "loading": "جاري التحميل...",
            "error": "حدث خطأ",
            "retry": "أعد المحاولة"
        }
    })
}

pub fn english_localization() -> Value {
    json!({
        "interface": {
            "home": "Home",
            "cart": "Cart",
            "categories": "Categories",
            "profile": "Profile",
            "search": "Search"
        },
        "products": {
            "addToCart": "Add to cart",
            "removeFromCart": "Remove from cart",
            "inStock": "In stock",
            "outOfStock": "Out of stock"
        },
        "accessibility": {
            "loading": "Loading...",
            "error": "Something went wrong",
            "retry": "Try again"
        }
    })
}

pub fn categories() -> Vec<Category> {
    [
        ("dates", "تمور", "🌴", 15),
        ("fruits", "فواكه", "🍎", 24),
        ("vegetables", "خضروات", "🥬", 18),
        ("honey", "عسل", "🍯", 8),
        ("nuts", "مكسرات", "🥜", 12),
    ]
    .into_iter()
    .map(|(id, name, icon, product_count)| Category {
        id: id.to_string(),
        name: name.to_string(),
        icon: icon.to_string(),
        product_count,
    })
    .collect()
}

pub fn popular_products() -> Vec<Product> {
    [
        ("1", "تمر مجيد", 12.5, "تمور", 4.5, "https://example.com/dates1.jpg"),
        ("2", "برتقال عماني", 8.0, "فواكه", 4.2, "https://example.com/orange.jpg"),
        ("3", "عسل السدر", 25.0, "عسل", 4.8, "https://example.com/honey.jpg"),
    ]
    .into_iter()
    .map(|(id, name, price, category, rating, image)| Product {
        id: id.to_string(),
        name: name.to_string(),
        description: None,
        category: Some(category.to_string()),
        price,
        rating: Some(rating),
        image: Some(image.to_string()),
        extra: Map::new(),
    })
    .collect()
}
