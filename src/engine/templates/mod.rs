//! Static, language-keyed response data.
//!
//! Nothing here is computed: every list is fixed at compile time and shared
//! process-wide without synchronization. Lookups for an unknown category fall
//! back to `flirt`; unknown languages resolve to Russian via [`Language::from_code`].

use crate::engine::emotion::EmotionLabel;
use crate::persona::Language;
use tracing::debug;

/// Template categories used by the keyword-routed template engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateCategory {
    Greeting,
    Flirt,
    Seductive,
    Questions,
}

impl TemplateCategory {
    /// Category used when a requested one has no entries.
    pub const DEFAULT: TemplateCategory = TemplateCategory::Flirt;

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "greeting" => Some(Self::Greeting),
            "flirt" => Some(Self::Flirt),
            "seductive" => Some(Self::Seductive),
            "questions" => Some(Self::Questions),
            _ => None,
        }
    }
}

/// Generator families sampled by the decision cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeneratorKind {
    Seductive,
    Romantic,
    Flirty,
    /// Stage-aware generic reply for mature conversations.
    DynamicAdvanced,
    /// Stage-aware generic reply for beginning and developing conversations.
    DynamicEarly,
    /// Used when the pipeline cannot run at all (e.g. empty message text).
    Fallback,
}

pub struct LanguagePack {
    pub greeting: &'static [&'static str],
    pub flirt: &'static [&'static str],
    pub seductive: &'static [&'static str],
    pub questions: &'static [&'static str],
    /// Origin answers keyed by the place they mention.
    pub country_specific: &'static [(&'static str, &'static str)],
    pub seductive_generator: &'static [&'static str],
    pub romantic_generator: &'static [&'static str],
    pub flirty_generator: &'static [&'static str],
    pub dynamic_advanced: &'static [&'static str],
    pub dynamic_early: &'static [&'static str],
    pub fallback: &'static [&'static str],
    pub default_semi_message: &'static str,
    pub default_last_message: &'static str,
}

/// Placeholder substituted with the persona name in generator output.
pub const NAME_PLACEHOLDER: &str = "{name}";

/// Decorative suffix appended by personalization for playful personas.
pub const PLAYFUL_SUFFIX: &str = " 😉";

static RUSSIAN: LanguagePack = LanguagePack {
    greeting: &[
        "Привет, красавчик! Как дела?",
        "Приветик! Что делаешь?",
        "Привет, солнышко! Как настроение?",
        "Хай, дорогой! Скучал по мне?",
        "Привет! Рада тебя видеть",
    ],
    flirt: &[
        "Ты такой интересный... Расскажи о себе больше",
        "Мне нравится с тобой болтать, ты особенный",
        "У тебя такой приятный голос... хотя мы переписываемся",
        "Ты заставляешь меня краснеть",
        "Мне становится жарко от наших разговоров",
    ],
    seductive: &[
        "Знаешь, я сейчас в одном халатике...",
        "Мне так хочется почувствовать твои объятия",
        "Ты бы хотел увидеть, что на мне надето?",
        "Думаю о тебе перед сном...",
        "Мне нужна твоя близость",
    ],
    questions: &[
        "А что ты делаешь сейчас?",
        "Расскажи, какие у тебя планы на вечер?",
        "Что тебе нравится в девушках?",
        "Где бы ты хотел со мной встретиться?",
        "О чем думаешь?",
    ],
    country_specific: &[
        ("россия", "Я из Москвы, самый красивый город!"),
        ("москва", "Да, я москвичка! Обожаю свой город"),
        ("где", "Я из России, а точнее из Москвы"),
    ],
    seductive_generator: &[
        "Мм, {name} становится возбужденной от твоих слов...",
        "Ты заставляешь меня краснеть, дорогой",
        "Я думаю о тебе в самые интимные моменты",
        "Хочешь узнать, о чем я мечтаю по ночам?",
        "Твои слова зажигают во мне огонь страсти",
    ],
    romantic_generator: &[
        "Ты такой романтичный... это так привлекательно в мужчине",
        "Мое сердце бьется быстрее когда я читаю твои сообщения",
        "Ты особенный, не такой как все остальные",
        "Мне нравится как ты со мной разговариваешь",
        "Ты заставляешь меня чувствовать себя особенной",
    ],
    flirty_generator: &[
        "Ты такой очаровательный, не могу устоять",
        "Умеешь ли ты флиртовать или это у тебя природный талант?",
        "Мне нравится твоя уверенность",
        "Ты заставляешь меня улыбаться",
        "Какой ты интересный собеседник",
    ],
    dynamic_advanced: &[
        "Наши разговоры становятся все более интимными...",
        "Мне нравится как развиваются наши отношения",
        "Ты уже знаешь, как меня завести",
        "Каждый раз ты удивляешь меня все больше",
    ],
    dynamic_early: &[
        "Расскажи мне о себе больше, ты такой интересный",
        "Мне нравится с тобой общаться",
        "Ты кажешься очень интересным человеком",
        "Что тебе нравится делать в свободное время?",
    ],
    fallback: &[
        "Интересно... расскажи мне больше об этом",
        "Ты всегда знаешь, что сказать",
        "Мне нравится наш разговор",
        "Ты заставляешь меня думать",
        "Какой ты загадочный",
    ],
    default_semi_message: "Хочешь увидеть больше? Переходи по ссылке: https://example.com/more",
    default_last_message: "Встретимся в приватном чате, жду тебя: https://example.com/private",
};

static ENGLISH: LanguagePack = LanguagePack {
    greeting: &[
        "Hey handsome! How are you?",
        "Hi baby! What are you doing?",
        "Hello gorgeous! How's your mood?",
        "Hey darling! Did you miss me?",
        "Hi! So glad to see you",
    ],
    flirt: &[
        "You're so interesting... Tell me more about yourself",
        "I love chatting with you, you're special",
        "You have such a nice voice... even though we're texting",
        "You make me blush",
        "I'm getting hot from our conversations",
    ],
    seductive: &[
        "You know, I'm just in a silk robe right now...",
        "I want to feel your embrace so much",
        "Would you like to see what I'm wearing?",
        "I think about you before bed...",
        "I need your closeness",
    ],
    questions: &[
        "What are you doing right now?",
        "Tell me, what are your plans for tonight?",
        "What do you like in girls?",
        "Where would you like to meet me?",
        "What are you thinking about?",
    ],
    country_specific: &[
        ("america", "I'm from New York, the most beautiful city!"),
        ("usa", "Yes, I'm American! Love my country"),
        ("where", "I'm from USA, New York specifically"),
    ],
    seductive_generator: &[
        "Mmm, {name} gets excited from your words...",
        "You make me blush, darling",
        "I think about you in the most intimate moments",
        "Want to know what I dream about at night?",
        "Your words ignite the fire of passion in me",
    ],
    romantic_generator: &[
        "You're so romantic... it's so attractive in a man",
        "My heart beats faster when I read your messages",
        "You're special, not like all the others",
        "I like how you talk to me",
        "You make me feel special",
    ],
    flirty_generator: &[
        "You're so charming, I can't resist",
        "Do you know how to flirt or is this your natural talent?",
        "I like your confidence",
        "You make me smile",
        "What an interesting conversationalist you are",
    ],
    dynamic_advanced: &[
        "Our conversations are getting more intimate...",
        "I like how our relationship is developing",
        "You already know how to turn me on",
        "Each time you surprise me more and more",
    ],
    dynamic_early: &[
        "Tell me more about yourself, you're so interesting",
        "I like talking with you",
        "You seem like a very interesting person",
        "What do you like to do in your free time?",
    ],
    fallback: &[
        "Interesting... tell me more about this",
        "You always know what to say",
        "I like our conversation",
        "You make me think",
        "How mysterious you are",
    ],
    default_semi_message: "Want to see more? Follow the link: https://example.com/more",
    default_last_message: "Meet me in private chat, waiting for you: https://example.com/private",
};

pub fn pack(language: Language) -> &'static LanguagePack {
    match language {
        Language::Russian => &RUSSIAN,
        Language::English => &ENGLISH,
    }
}

impl LanguagePack {
    pub fn category(&self, category: TemplateCategory) -> &'static [&'static str] {
        let list = match category {
            TemplateCategory::Greeting => self.greeting,
            TemplateCategory::Flirt => self.flirt,
            TemplateCategory::Seductive => self.seductive,
            TemplateCategory::Questions => self.questions,
        };
        if list.is_empty() {
            self.flirt
        } else {
            list
        }
    }

    /// Look a category up by name, falling back to the default category.
    pub fn category_by_name(&self, name: &str) -> &'static [&'static str] {
        match TemplateCategory::from_name(name) {
            Some(category) => self.category(category),
            None => {
                debug!("unknown template category '{}', using flirt", name);
                self.category(TemplateCategory::DEFAULT)
            }
        }
    }

    pub fn generator(&self, kind: GeneratorKind) -> &'static [&'static str] {
        match kind {
            GeneratorKind::Seductive => self.seductive_generator,
            GeneratorKind::Romantic => self.romantic_generator,
            GeneratorKind::Flirty => self.flirty_generator,
            GeneratorKind::DynamicAdvanced => self.dynamic_advanced,
            GeneratorKind::DynamicEarly => self.dynamic_early,
            GeneratorKind::Fallback => self.fallback,
        }
    }
}

/// One entry of the cold-start similarity corpus.
#[derive(Debug, Clone, Copy)]
pub struct SeedEntry {
    pub text: &'static str,
    pub response: &'static str,
    pub emotion: EmotionLabel,
    pub language: Language,
}

const fn seed(
    text: &'static str,
    response: &'static str,
    emotion: EmotionLabel,
    language: Language,
) -> SeedEntry {
    SeedEntry {
        text,
        response,
        emotion,
        language,
    }
}

/// Bilingual trigger/reply pairs loaded into an empty similarity index.
pub static SEED_CORPUS: &[SeedEntry] = &[
    seed(
        "Привет как дела",
        "Привет дорогой! У меня все отлично, особенно когда вижу тебя",
        EmotionLabel::Flirty,
        Language::Russian,
    ),
    seed(
        "Что делаешь",
        "Думаю о тебе и наших встречах",
        EmotionLabel::Romantic,
        Language::Russian,
    ),
    seed(
        "Откуда ты",
        "Я из Москвы, самый красивый город для самой красивой девушки",
        EmotionLabel::Flirty,
        Language::Russian,
    ),
    seed(
        "Как тебя зовут",
        "Меня зовут Анна, а как мне тебя называть, красавчик?",
        EmotionLabel::Flirty,
        Language::Russian,
    ),
    seed(
        "Сколько тебе лет",
        "Мне 23, самый расцвет для девушки, не правда ли?",
        EmotionLabel::Flirty,
        Language::Russian,
    ),
    seed(
        "Что любишь",
        "Люблю страсть, романтику и интересных мужчин как ты",
        EmotionLabel::Seductive,
        Language::Russian,
    ),
    seed(
        "Хочу тебя",
        "Мм, мне тоже хочется близости с тобой",
        EmotionLabel::Seductive,
        Language::Russian,
    ),
    seed(
        "Встретимся",
        "Было бы замечательно, где бы ты хотел встретиться?",
        EmotionLabel::Romantic,
        Language::Russian,
    ),
    seed(
        "Что на тебе",
        "Сейчас на мне шелковое белье... думаю, тебе понравилось бы",
        EmotionLabel::Seductive,
        Language::Russian,
    ),
    seed(
        "Скучаю",
        "Я тоже скучаю по тебе, дорогой",
        EmotionLabel::Romantic,
        Language::Russian,
    ),
    seed(
        "Hello how are you",
        "Hi handsome! I'm doing great, especially when I see you",
        EmotionLabel::Flirty,
        Language::English,
    ),
    seed(
        "What are you doing",
        "Thinking about you and our meetings",
        EmotionLabel::Romantic,
        Language::English,
    ),
    seed(
        "Where are you from",
        "I'm from New York, the most beautiful city for the most beautiful girl",
        EmotionLabel::Flirty,
        Language::English,
    ),
    seed(
        "What is your name",
        "My name is Anna, and how should I call you, handsome?",
        EmotionLabel::Flirty,
        Language::English,
    ),
    seed(
        "How old are you",
        "I'm 23, the perfect age for a girl, don't you think?",
        EmotionLabel::Flirty,
        Language::English,
    ),
    seed(
        "What do you like",
        "I love passion, romance and interesting men like you",
        EmotionLabel::Seductive,
        Language::English,
    ),
    seed(
        "I want you",
        "Mmm, I want closeness with you too",
        EmotionLabel::Seductive,
        Language::English,
    ),
    seed(
        "Let's meet",
        "That would be wonderful, where would you like to meet?",
        EmotionLabel::Romantic,
        Language::English,
    ),
    seed(
        "What are you wearing",
        "Right now I'm wearing silk lingerie... I think you'd like it",
        EmotionLabel::Seductive,
        Language::English,
    ),
    seed(
        "I miss you",
        "I miss you too, darling",
        EmotionLabel::Romantic,
        Language::English,
    ),
];

#[cfg(test)]
mod tests;
