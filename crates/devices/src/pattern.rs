//! Command and reply templates
//!
//! A template is the literal text of a command or reply with two
//! placeholders: `{v}` for the value and `{i}` for the channel (input or
//! group number). Any other character, `{` included, is literal, so the DVS
//! zoom command is written `{v}{`.

const VALUE: &str = "{v}";
const CHANNEL: &str = "{i}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Literal(&'a str),
    Channel,
    Value,
}

fn tokens(template: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut rest = template;
    loop {
        let next = [(VALUE, Token::Value), (CHANNEL, Token::Channel)]
            .into_iter()
            .filter_map(|(marker, token)| rest.find(marker).map(|at| (at, marker.len(), token)))
            .min_by_key(|(at, ..)| *at);

        let Some((at, len, token)) = next else {
            if !rest.is_empty() {
                tokens.push(Token::Literal(rest));
            }
            return tokens;
        };
        if at > 0 {
            tokens.push(Token::Literal(&rest[..at]));
        }
        tokens.push(token);
        rest = &rest[at + len..];
    }
}

/// What a template's placeholders matched in a line.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Captures<'a> {
    pub channel: Option<&'a str>,
    pub value: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Template(&'static str);

impl Template {
    pub const fn new(template: &'static str) -> Self {
        Self(template)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }

    pub fn has_channel(&self) -> bool {
        self.0.contains(CHANNEL)
    }

    /// Fill in the placeholders. A missing channel or value renders as nothing.
    pub fn render(&self, channel: Option<u32>, value: Option<&str>) -> String {
        let mut out = String::with_capacity(self.0.len() + 8);
        for token in tokens(self.0) {
            match token {
                Token::Literal(literal) => out.push_str(literal),
                Token::Channel => {
                    if let Some(channel) = channel {
                        out.push_str(&channel.to_string());
                    }
                }
                Token::Value => out.push_str(value.unwrap_or_default()),
            }
        }
        out
    }

    /// Match a whole line against the template.
    ///
    /// Each placeholder captures a non-empty run of text up to the next
    /// literal, or to the end of the line.
    ///
    /// ```
    /// use devices::pattern::Template;
    ///
    /// let notice = Template::new("{i}Typ{v}");
    /// let captures = notice.parse("2Typ4").unwrap();
    /// assert_eq!(captures.channel, Some("2"));
    /// assert_eq!(captures.value, Some("4"));
    /// assert!(notice.parse("2Typ").is_none());
    /// ```
    pub fn parse<'a>(&self, line: &'a str) -> Option<Captures<'a>> {
        let mut captures = Captures::default();
        let mut rest = line;
        let mut tokens = tokens(self.0).into_iter().peekable();

        while let Some(token) = tokens.next() {
            let slot = match token {
                Token::Literal(literal) => {
                    rest = rest.strip_prefix(literal)?;
                    continue;
                }
                Token::Channel => &mut captures.channel,
                Token::Value => &mut captures.value,
            };
            let end = match tokens.peek() {
                Some(Token::Literal(literal)) => rest.find(literal)?,
                // two placeholders in a row cannot be told apart
                Some(_) => return None,
                None => rest.len(),
            };
            if end == 0 {
                return None;
            }
            *slot = Some(&rest[..end]);
            rest = &rest[end..];
        }

        rest.is_empty().then_some(captures)
    }
}
