//! Line parsing for the wire protocol.
//!
//! A decrypted line is `<COMMAND> [argument…]`: the command is everything
//! up to the first whitespace run, the argument is the remainder with
//! leading whitespace stripped but interior whitespace preserved.

/// Split a line into `(command, argument)`.
pub fn parse(line: &str) -> (&str, &str) {
    let line = line.trim();
    match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim_start()),
        None => (line, ""),
    }
}

/// Split an argument into its first token and the rest, same rules as
/// [`parse`]. Used by commands like PRIVMSG and KICK that take a target
/// followed by free text.
pub fn split_arg(argument: &str) -> (&str, &str) {
    match argument.split_once(char::is_whitespace) {
        Some((first, rest)) => (first, rest.trim_start()),
        None => (argument, ""),
    }
}

/// Channel names start with the `#` sigil.
pub fn is_channel(name: &str) -> bool {
    name.starts_with('#')
}
