#[cfg(test)]
mod peers;
#[cfg(test)]
mod response_timeout;
#[cfg(test)]
mod single_install;
