/// Quote `arg` as a single POSIX shell word.
pub fn shell_quote(arg: &str) -> String {
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('\'');

    for c in arg.chars() {
        if c == '\'' {
            quoted.push_str(r"'\''");
        } else {
            quoted.push(c);
        }
    }

    quoted.push('\'');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("LOSSLESS"), "'LOSSLESS'");
        assert_eq!(shell_quote("/music/My Albums"), "'/music/My Albums'");
        assert_eq!(shell_quote("$HOME; rm -rf ~"), "'$HOME; rm -rf ~'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(r#"say "hi""#), r#"'say "hi"'"#);
    }
}
