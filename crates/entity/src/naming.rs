//! Naming conventions used for default table, foreign-key and join-table names

/// Inflection rules behind every default name the engine derives.
///
/// Swap the implementation on the entity manager to change conventions
/// without touching the schema cache or the relation resolver.
pub trait NamingConvention: Send + Sync {
    /// `BlogPost` -> `blog_post`
    fn underscore(&self, name: &str) -> String;

    /// `post` -> `posts`
    fn pluralize(&self, word: &str) -> String;

    /// Default table for an entity type: `BlogPost` -> `blog_posts`
    fn table_name(&self, entity: &str) -> String {
        self.pluralize(&self.underscore(entity))
    }

    /// Default foreign key pointing at `entity`: `Post` + `id` -> `post_id`
    fn foreign_key(&self, entity: &str, primary_key: &str) -> String {
        self.underscore(&format!("{}_{}", entity, primary_key))
    }

    /// Default join table between two entity types: `Post` + `Tag` -> `post_tag`
    fn join_table(&self, owner: &str, target: &str) -> String {
        self.underscore(&format!("{}_{}", owner, target))
    }
}

/// English underscore/plural conventions
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultNamingConvention;

impl NamingConvention for DefaultNamingConvention {
    fn underscore(&self, name: &str) -> String {
        let chars: Vec<char> = name.chars().collect();
        let mut result = String::with_capacity(name.len() + 4);

        for (i, &ch) in chars.iter().enumerate() {
            if ch.is_uppercase() {
                let prev = if i > 0 { chars.get(i - 1) } else { None };
                let next = chars.get(i + 1);
                let boundary = match prev {
                    Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                    Some(p) if p.is_uppercase() => next.map(|n| n.is_lowercase()).unwrap_or(false),
                    _ => false,
                };
                if boundary && !result.ends_with('_') {
                    result.push('_');
                }
                result.extend(ch.to_lowercase());
            } else if ch == '-' || ch == ' ' {
                if !result.ends_with('_') {
                    result.push('_');
                }
            } else {
                result.push(ch);
            }
        }

        result
    }

    fn pluralize(&self, word: &str) -> String {
        if word.ends_with('y')
            && !word.ends_with("ay")
            && !word.ends_with("ey")
            && !word.ends_with("iy")
            && !word.ends_with("oy")
            && !word.ends_with("uy")
        {
            format!("{}ies", &word[..word.len() - 1])
        } else if word.ends_with('s')
            || word.ends_with("sh")
            || word.ends_with("ch")
            || word.ends_with('x')
            || word.ends_with('z')
        {
            format!("{}es", word)
        } else {
            format!("{}s", word)
        }
    }
}
