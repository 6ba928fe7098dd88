use std::collections::HashMap;

use molasses::{ClientConfig, User};

pub fn main() {
    env_logger::init();

    let api_key = std::env::var("MOLASSES_API_KEY").unwrap();

    // Blocks until the first fetch attempt completes. Until a fetch succeeds, all features are
    // inactive.
    let client = ClientConfig::from_api_key(api_key).init().unwrap();

    let user = User::new("test-user").with_param("country", "us");
    let active = client.is_active("NEW_CHECKOUT", Some(&user));
    println!("NEW_CHECKOUT active: {:?}", active);

    if active {
        client.experiment_success(
            "NEW_CHECKOUT",
            &user,
            HashMap::from([("button_color".to_owned(), "green".to_owned())]),
        );
    }

    // Flush pending events before exiting.
    client.stop();
}
