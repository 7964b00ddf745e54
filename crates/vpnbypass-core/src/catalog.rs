// ── Built-in service catalog ──
//
// Services shipped with the engine. All start disabled; the config crate
// merges entries missing from an older config document on load.

use crate::model::ServiceEntry;

/// The built-in catalog, in display order.
pub fn builtin_services() -> Vec<ServiceEntry> {
    vec![
        ServiceEntry::new(
            "telegram",
            "Telegram",
            &[
                "telegram.org",
                "web.telegram.org",
                "t.me",
                "telegram.me",
                "core.telegram.org",
                "api.telegram.org",
                "cdn-telegram.org",
            ],
            &[
                "91.108.4.0/22",
                "91.108.8.0/22",
                "91.108.12.0/22",
                "91.108.16.0/22",
                "91.108.20.0/22",
                "91.108.56.0/22",
                "95.161.64.0/20",
                "149.154.160.0/20",
            ],
        ),
        ServiceEntry::new(
            "whatsapp",
            "WhatsApp",
            &[
                "whatsapp.com",
                "web.whatsapp.com",
                "whatsapp.net",
                "g.whatsapp.net",
                "mmg.whatsapp.net",
                "static.whatsapp.net",
            ],
            &[],
        ),
        ServiceEntry::new(
            "signal",
            "Signal",
            &[
                "signal.org",
                "chat.signal.org",
                "storage.signal.org",
                "cdn.signal.org",
                "cdn2.signal.org",
                "sfu.voip.signal.org",
            ],
            &[],
        ),
        ServiceEntry::new(
            "discord",
            "Discord",
            &[
                "discord.com",
                "discord.gg",
                "discordapp.com",
                "discordapp.net",
                "cdn.discordapp.com",
                "gateway.discord.gg",
                "media.discordapp.net",
            ],
            &[],
        ),
        ServiceEntry::new(
            "slack",
            "Slack",
            &[
                "slack.com",
                "app.slack.com",
                "wss-primary.slack.com",
                "files.slack.com",
                "slack-edge.com",
                "a.slack-edge.com",
            ],
            &[],
        ),
        ServiceEntry::new(
            "zoom",
            "Zoom",
            &["zoom.us", "us02web.zoom.us", "zoomgov.com", "zoom.com"],
            &[
                "3.7.35.0/25",
                "3.21.137.128/25",
                "3.22.11.0/24",
                "3.23.93.0/24",
                "3.25.41.128/25",
                "3.25.42.0/25",
                "8.5.128.0/23",
                "52.81.151.128/25",
                "64.125.62.0/24",
                "64.211.144.0/24",
                "69.174.57.0/24",
                "69.174.108.0/22",
                "99.79.20.0/25",
                "101.36.167.0/24",
                "115.110.154.192/26",
                "147.124.96.0/19",
                "160.1.56.128/25",
                "161.199.136.0/22",
                "162.12.232.0/22",
                "162.255.36.0/22",
                "170.114.0.0/16",
                "193.122.32.0/20",
                "198.251.128.0/17",
                "209.9.211.0/24",
                "209.9.215.0/24",
                "213.19.144.0/24",
                "213.19.153.0/24",
                "213.244.140.0/24",
                "221.122.88.64/27",
                "221.122.89.128/25",
            ],
        ),
        ServiceEntry::new(
            "youtube",
            "YouTube",
            &[
                "youtube.com",
                "www.youtube.com",
                "m.youtube.com",
                "youtu.be",
                "i.ytimg.com",
                "yt3.ggpht.com",
                "youtubei.googleapis.com",
            ],
            &[],
        ),
        ServiceEntry::new(
            "netflix",
            "Netflix",
            &[
                "netflix.com",
                "www.netflix.com",
                "api-global.netflix.com",
                "nflxvideo.net",
                "nflximg.net",
                "nflxext.com",
                "nflxso.net",
            ],
            &[
                "23.246.0.0/18",
                "37.77.184.0/21",
                "45.57.0.0/17",
                "64.120.128.0/17",
                "66.197.128.0/17",
                "108.175.32.0/20",
                "185.2.220.0/22",
                "185.9.188.0/22",
                "192.173.64.0/18",
                "198.38.96.0/19",
                "198.45.48.0/20",
            ],
        ),
        ServiceEntry::new(
            "spotify",
            "Spotify",
            &[
                "spotify.com",
                "open.spotify.com",
                "api.spotify.com",
                "apresolve.spotify.com",
                "audio-ak-spotify-com.akamaized.net",
                "scdn.co",
                "i.scdn.co",
            ],
            &["35.186.224.0/20", "104.154.127.0/24"],
        ),
        ServiceEntry::new(
            "twitch",
            "Twitch",
            &[
                "twitch.tv",
                "www.twitch.tv",
                "gql.twitch.tv",
                "usher.ttvnw.net",
                "static.twitchcdn.net",
                "jtvnw.net",
            ],
            &["185.42.204.0/22", "192.108.239.0/24"],
        ),
        ServiceEntry::new(
            "tailscale",
            "Tailscale",
            &[
                "tailscale.com",
                "login.tailscale.com",
                "controlplane.tailscale.com",
                "log.tailscale.io",
                "derp1.tailscale.com",
                "derp2.tailscale.com",
                "derp3.tailscale.com",
                "derp4.tailscale.com",
                "derp5.tailscale.com",
            ],
            &[],
        ),
        ServiceEntry::new(
            "zerotier",
            "ZeroTier",
            &["zerotier.com", "my.zerotier.com", "api.zerotier.com"],
            &["103.195.103.66/32", "84.17.53.155/32", "104.194.8.134/32"],
        ),
    ]
}
