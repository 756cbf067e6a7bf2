//! Templates baked into the binary for `proofgate init`.

macro_rules! embedded_templates {
    ($($name:expr => $const_name:ident),* $(,)?) => {
        $(
            pub const $const_name: &str =
                include_str!(concat!("../../templates/", $name));
        )*

        pub fn get_template(name: &str) -> Option<&'static str> {
            match name {
                $( $name => Some($const_name), )*
                _ => None,
            }
        }

        pub fn list_templates() -> Vec<&'static str> {
            vec![ $( $name, )* ]
        }
    };
}

embedded_templates! {
    "config.toml" => TEMPLATE_CONFIG,
    "routes.toml" => TEMPLATE_ROUTES,
    "gitignore" => TEMPLATE_GITIGNORE,
}
